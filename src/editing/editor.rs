use log::debug;

use crate::convert::markdown::{document_to_markdown, markdown_to_document};
use crate::convert::source::parse_markdown;
use crate::editing::ops::StructuralError;
use crate::editing::{History, Snapshot, Transform};
use crate::models::{Document, MdNode};
use crate::schema::{self, PluginRegistry};

/// The result of a committed edit, handed to the host document store.
///
/// `save` is `false` exactly for undo/redo history navigation, so the host's
/// autosave can tell content edits from history moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub document: MdNode,
    pub save: bool,
}

/// Owns the current snapshot, the undo/redo history and the plugin registry.
///
/// Construction takes an initial Markdown AST (or the empty-document
/// sentinel); every committed transform yields a [`Change`] carrying the
/// serialized Markdown AST back to the host. The schema normalization rule
/// runs after every commit, so a reachable snapshot always has at least one
/// block.
pub struct Editor {
    snapshot: Snapshot,
    history: History,
    plugins: PluginRegistry,
}

impl Editor {
    pub fn new(initial: Option<&MdNode>, plugins: PluginRegistry) -> Self {
        let document = match initial {
            Some(md) => markdown_to_document(md, &plugins),
            None => Document::empty(),
        };
        let snapshot = schema::normalize(Snapshot::new(document));
        Editor {
            snapshot,
            history: History::new(),
            plugins,
        }
    }

    /// Convenience constructor from markdown source text.
    pub fn from_markdown(source: &str, plugins: PluginRegistry) -> Self {
        let md = parse_markdown(source);
        Editor::new(Some(&md), plugins)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn document(&self) -> &Document {
        &self.snapshot.document
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Current document serialized to a Markdown AST.
    pub fn to_markdown(&self) -> MdNode {
        document_to_markdown(&self.snapshot.document, &self.plugins)
    }

    /// Commit a transform as one undo step. On failure nothing changes.
    pub fn apply(&mut self, transform: Transform) -> Result<Change, StructuralError> {
        if transform.is_empty() {
            return Ok(self.change(true));
        }
        let next = schema::normalize(transform.apply_to(&self.snapshot)?);
        self.history.record(self.snapshot.clone());
        self.snapshot = next;
        Ok(self.change(true))
    }

    /// Commit an externally produced snapshot (the list/table editing
    /// collaborator) as one undo step.
    pub fn commit_snapshot(&mut self, snapshot: Snapshot) -> Change {
        let next = schema::normalize(snapshot);
        self.history.record(self.snapshot.clone());
        self.snapshot = next;
        self.change(true)
    }

    /// Step back through history. No-op past the oldest snapshot.
    pub fn undo(&mut self) -> Option<Change> {
        let previous = self.history.undo(self.snapshot.clone())?;
        debug!("undo");
        self.snapshot = previous;
        Some(self.change(false))
    }

    /// Step forward again. No-op unless an undo preceded.
    pub fn redo(&mut self) -> Option<Change> {
        let next = self.history.redo(self.snapshot.clone())?;
        debug!("redo");
        self.snapshot = next;
        Some(self.change(false))
    }

    fn change(&self, save: bool) -> Change {
        Change {
            document: self.to_markdown(),
            save,
        }
    }
}

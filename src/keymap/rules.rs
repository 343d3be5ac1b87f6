use crate::editing::{Change, Editor, Snapshot, StructuralError, Transform};
use crate::keymap::{
    BackspaceConfig, Dispatch, KeyEvent, KeyPress, SoftBreakConfig, StructuralEditor,
};
use crate::models::{Block, BlockType, MarkType, Node};

/// One dispatcher rule: a predicate over (event, snapshot) plus a handler.
/// A handler returning `Unhandled` declines the event and scanning
/// continues with the next rule.
pub trait KeyRule {
    fn name(&self) -> &'static str;
    fn matches(&self, event: &KeyEvent, snapshot: &Snapshot) -> bool;
    fn apply(&self, event: &KeyEvent, editor: &mut Editor)
        -> Result<Dispatch, StructuralError>;
}

fn handled(change: Change) -> Result<Dispatch, StructuralError> {
    Ok(Dispatch::Handled(change))
}

// ---------------------------------------------------------------------------
// Rule 1: Enter on a top-level void block

/// Enter with a collapsed selection on a top-level void block inserts a
/// default paragraph before it (when it is the first child) or after it,
/// and moves the cursor into the new block, instead of trying to type
/// into a block that has no editable text.
pub struct VoidBlockEnter;

impl KeyRule for VoidBlockEnter {
    fn name(&self) -> &'static str {
        "void-block-enter"
    }

    fn matches(&self, event: &KeyEvent, snapshot: &Snapshot) -> bool {
        if event.key != KeyPress::Enter || event.modifier {
            return false;
        }
        if !snapshot.selection.is_collapsed() {
            return false;
        }
        let (Some(focus), Some(top)) = (snapshot.focus_block(), snapshot.focus_top_block())
        else {
            return false;
        };
        focus.key == top.key && top.is_void()
    }

    fn apply(
        &self,
        _event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        let (doc_key, index) = {
            let snapshot = editor.snapshot();
            let doc_key = snapshot.document.key;
            let Some(top) = snapshot.focus_top_block() else {
                return Ok(Dispatch::Unhandled);
            };
            let (_, index) = snapshot
                .document
                .parent_of(top.key)
                .ok_or(StructuralError::UnknownKey(top.key))?;
            (doc_key, index)
        };
        let target = if index == 0 { 0 } else { index + 1 };
        let paragraph = Block::default_block();
        let paragraph_key = paragraph.key;
        let change = editor.apply(
            Transform::new()
                .insert_node_by_key(doc_key, target, Node::Block(paragraph))
                .collapse_to_start_of(paragraph_key),
        )?;
        handled(change)
    }
}

// ---------------------------------------------------------------------------
// Rules 2 and 3: history shortcuts

/// Modifier+Z undoes (redoes with Shift held); Modifier+Y redoes. The
/// resulting change carries `save == false` so history navigation never
/// trips the host's autosave.
pub struct HistoryShortcut;

impl KeyRule for HistoryShortcut {
    fn name(&self) -> &'static str {
        "history-shortcut"
    }

    fn matches(&self, event: &KeyEvent, _snapshot: &Snapshot) -> bool {
        event.modifier
            && matches!(event.key, KeyPress::Char(c) if c.eq_ignore_ascii_case(&'z') || c.eq_ignore_ascii_case(&'y'))
    }

    fn apply(
        &self,
        event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        let redo = match event.key {
            KeyPress::Char(c) if c.eq_ignore_ascii_case(&'y') => true,
            _ => event.shift,
        };
        let change = if redo { editor.redo() } else { editor.undo() };
        Ok(change.map(Dispatch::Handled).unwrap_or(Dispatch::Noop))
    }
}

// ---------------------------------------------------------------------------
// Rule 4: mark shortcuts

/// Modifier+{b,i,u,s,`} toggles the matching mark over the selection.
pub struct MarkShortcut;

fn mark_for_char(c: char) -> Option<MarkType> {
    match c.to_ascii_lowercase() {
        'b' => Some(MarkType::Bold),
        'i' => Some(MarkType::Italic),
        'u' => Some(MarkType::Underline),
        's' => Some(MarkType::Strikethrough),
        '`' => Some(MarkType::Code),
        _ => None,
    }
}

impl KeyRule for MarkShortcut {
    fn name(&self) -> &'static str {
        "mark-shortcut"
    }

    fn matches(&self, event: &KeyEvent, _snapshot: &Snapshot) -> bool {
        event.modifier
            && matches!(event.key, KeyPress::Char(c) if mark_for_char(c).is_some())
    }

    fn apply(
        &self,
        event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        let KeyPress::Char(c) = event.key else {
            return Ok(Dispatch::Unhandled);
        };
        let Some(mark) = mark_for_char(c) else {
            return Ok(Dispatch::Unhandled);
        };
        let change = editor.apply(Transform::new().toggle_mark(mark))?;
        handled(change)
    }
}

// ---------------------------------------------------------------------------
// Rule 5: list/table delegation

const STRUCTURAL_TYPES: [BlockType; 6] = [
    BlockType::ListItem,
    BlockType::BulletedList,
    BlockType::NumberedList,
    BlockType::Table,
    BlockType::TableRow,
    BlockType::TableCell,
];

/// Defers Enter/Backspace/Tab inside list and table blocks to the external
/// structural-editing collaborator. A `None` from the collaborator declines
/// the event so the later rules still get a look.
pub struct StructuralDelegation {
    structural: Box<dyn StructuralEditor>,
}

impl StructuralDelegation {
    pub fn new(structural: Box<dyn StructuralEditor>) -> Self {
        StructuralDelegation { structural }
    }
}

impl KeyRule for StructuralDelegation {
    fn name(&self) -> &'static str {
        "list-table-delegation"
    }

    fn matches(&self, event: &KeyEvent, snapshot: &Snapshot) -> bool {
        if !matches!(
            event.key,
            KeyPress::Enter | KeyPress::Backspace | KeyPress::Tab
        ) {
            return false;
        }
        let focus = snapshot.selection.focus;
        let Some(keys) = snapshot.document.path_keys(focus.key) else {
            return false;
        };
        keys.iter().any(|key| {
            snapshot
                .document
                .get_block(*key)
                .map(|b| STRUCTURAL_TYPES.contains(&b.ty))
                .unwrap_or(false)
        })
    }

    fn apply(
        &self,
        event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        match self.structural.handle(event, editor.snapshot()) {
            Some(snapshot) => handled(editor.commit_snapshot(snapshot)),
            None => Ok(Dispatch::Unhandled),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule 6: soft break

/// Enter in a code-like block inserts a literal newline; once the trailing
/// `close_after` chars are all newlines, the block "closes" instead: the
/// newlines are deleted, configured container ancestors unwrap, and the
/// cursor moves into a fresh default paragraph.
pub struct SoftBreak {
    config: SoftBreakConfig,
}

impl SoftBreak {
    pub fn new(config: SoftBreakConfig) -> Self {
        SoftBreak { config }
    }
}

impl KeyRule for SoftBreak {
    fn name(&self) -> &'static str {
        "soft-break"
    }

    fn matches(&self, event: &KeyEvent, snapshot: &Snapshot) -> bool {
        if event.key != KeyPress::Enter || event.modifier {
            return false;
        }
        if self.config.require_shift && !event.shift {
            return false;
        }
        let Some(block) = snapshot.focus_block() else {
            return false;
        };
        !block.is_void() && !self.config.ignore_in.contains(&block.ty)
    }

    fn apply(
        &self,
        _event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        let focus = editor.snapshot().selection.focus;
        let (block_key, text, wrappers) = {
            let snapshot = editor.snapshot();
            let Some(block) = snapshot.focus_block() else {
                return Ok(Dispatch::Unhandled);
            };
            let block_key = block.key;
            // Configured container types present strictly above the block
            let mut wrappers = Vec::new();
            if let Some(keys) = snapshot.document.path_keys(focus.key) {
                for key in keys {
                    if key == block_key {
                        continue;
                    }
                    if let Some(ancestor) = snapshot.document.get_block(key) {
                        if self.config.unwrap.contains(&ancestor.ty)
                            && !wrappers.contains(&ancestor.ty)
                        {
                            wrappers.push(ancestor.ty.clone());
                        }
                    }
                }
            }
            (block_key, block.text(), wrappers)
        };

        let n = self.config.close_after;
        let closes = n > 0
            && text.chars().count() >= n
            && text.chars().rev().take(n).all(|c| c == '\n');

        let change = if closes {
            let mut transform = Transform::new()
                .collapse_to_end_of(block_key)
                .delete_backward(n);
            for ty in wrappers {
                transform = transform.unwrap_block(ty);
            }
            transform = transform.insert_block(Block::default_block());
            editor.apply(transform)?
        } else {
            editor.apply(Transform::new().insert_text(focus, "\n"))?
        };
        handled(change)
    }
}

// ---------------------------------------------------------------------------
// Rule 7: backspace in an empty block

/// Backspace in an empty non-default block retypes it to a paragraph, so
/// the cursor never gets stuck in an empty quote/heading/code block.
pub struct EmptyBlockBackspace {
    config: BackspaceConfig,
}

impl EmptyBlockBackspace {
    pub fn new(config: BackspaceConfig) -> Self {
        EmptyBlockBackspace { config }
    }
}

impl KeyRule for EmptyBlockBackspace {
    fn name(&self) -> &'static str {
        "empty-block-backspace"
    }

    fn matches(&self, event: &KeyEvent, snapshot: &Snapshot) -> bool {
        if event.key != KeyPress::Backspace || event.modifier {
            return false;
        }
        if !snapshot.selection.is_collapsed() {
            return false;
        }
        let Some(block) = snapshot.focus_block() else {
            return false;
        };
        !block.is_void()
            && !self.config.ignore_in.contains(&block.ty)
            && block.text().is_empty()
    }

    fn apply(
        &self,
        _event: &KeyEvent,
        editor: &mut Editor,
    ) -> Result<Dispatch, StructuralError> {
        let block_key = {
            let Some(block) = editor.snapshot().focus_block() else {
                return Ok(Dispatch::Unhandled);
            };
            block.key
        };
        let change = editor.apply(
            Transform::new()
                .set_block(BlockType::Paragraph)
                .collapse_to_start_of(block_key),
        )?;
        handled(change)
    }
}

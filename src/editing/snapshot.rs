use std::collections::BTreeSet;

use crate::models::{Document, Key, MarkType};

/// A position in the document: a text node key plus a char offset into that
/// node's concatenated leaves.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Point {
    pub key: Key,
    pub offset: usize,
}

impl Point {
    pub fn new(key: Key, offset: usize) -> Self {
        Point { key, offset }
    }
}

/// Anchor + focus points. Collapsed when they coincide.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
    pub is_focused: bool,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Selection {
            anchor,
            focus,
            is_focused: true,
        }
    }

    pub fn collapsed(point: Point) -> Self {
        Selection::new(point, point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn collapse_to(&self, point: Point) -> Self {
        Selection {
            anchor: point,
            focus: point,
            is_focused: self.is_focused,
        }
    }
}

/// One immutable editor state: document, selection and pending cursor marks.
///
/// Transforms take a snapshot and return a new one; the old value stays
/// valid, which is what makes the undo history cheap to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub document: Document,
    pub selection: Selection,
    /// Marks queued at a collapsed cursor, applied to the next insert.
    pub marks: Option<BTreeSet<MarkType>>,
}

impl Snapshot {
    /// Snapshot with the cursor at the start of the first text node. A
    /// document with no text gets a placeholder selection on the root, which
    /// the schema normalization rule replaces on the first commit.
    pub fn new(document: Document) -> Self {
        let point = document
            .text_order()
            .first()
            .map(|&key| Point::new(key, 0))
            .unwrap_or(Point::new(document.key, 0));
        Snapshot {
            selection: Selection::collapsed(point),
            document,
            marks: None,
        }
    }

    /// Focus block: the nearest block ancestor of the focus point.
    pub fn focus_block(&self) -> Option<&crate::models::Block> {
        self.document.closest_block(self.selection.focus.key)
    }

    /// Top-level ancestor block of the focus point.
    pub fn focus_top_block(&self) -> Option<&crate::models::Block> {
        self.document.top_block(self.selection.focus.key)
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

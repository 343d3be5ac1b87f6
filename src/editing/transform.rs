use crate::editing::ops::{apply_op, Op, StructuralError};
use crate::editing::{Point, Snapshot};
use crate::models::{Block, BlockType, Fragment, Key, MarkType, Node};

/// An explicit edit builder: chainable methods accumulate atomic ops, and
/// [`crate::editing::Editor::apply`] commits the whole batch as a single
/// undo step. Nothing mutates until commit; a failing op aborts the whole
/// batch and the editor state is untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    ops: Vec<Op>,
}

impl Transform {
    pub fn new() -> Self {
        Transform::default()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn insert_text(self, at: Point, text: impl Into<String>) -> Self {
        self.push(Op::InsertText {
            at,
            text: text.into(),
        })
    }

    pub fn delete_backward(self, n: usize) -> Self {
        self.push(Op::DeleteBackward { n })
    }

    pub fn delete_forward(self, n: usize) -> Self {
        self.push(Op::DeleteForward { n })
    }

    pub fn set_block(self, ty: BlockType) -> Self {
        self.push(Op::SetBlock { ty })
    }

    pub fn wrap_block(self, ty: BlockType) -> Self {
        self.push(Op::WrapBlock { ty })
    }

    pub fn unwrap_block(self, ty: BlockType) -> Self {
        self.push(Op::UnwrapBlock { ty })
    }

    pub fn toggle_mark(self, mark: MarkType) -> Self {
        self.push(Op::ToggleMark { mark })
    }

    pub fn insert_block(self, block: Block) -> Self {
        self.push(Op::InsertBlock { block })
    }

    pub fn insert_fragment(self, fragment: Fragment) -> Self {
        self.push(Op::InsertFragment { fragment })
    }

    pub fn insert_node_by_key(self, parent: Key, index: usize, node: Node) -> Self {
        self.push(Op::InsertNodeByKey {
            parent,
            index,
            node,
        })
    }

    pub fn insert_link(self, href: impl Into<String>, text: impl Into<String>) -> Self {
        self.push(Op::InsertLink {
            href: href.into(),
            text: text.into(),
        })
    }

    pub fn collapse_to_start_of(self, key: Key) -> Self {
        self.push(Op::CollapseToStartOf { key })
    }

    pub fn collapse_to_end_of(self, key: Key) -> Self {
        self.push(Op::CollapseToEndOf { key })
    }

    pub fn focus(self) -> Self {
        self.push(Op::Focus)
    }

    /// Apply every accumulated op in order against a snapshot. Pure: the
    /// input snapshot is left untouched even on failure.
    pub fn apply_to(&self, snapshot: &Snapshot) -> Result<Snapshot, StructuralError> {
        let mut current = snapshot.clone();
        for op in &self.ops {
            current = apply_op(&current, op)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editing::Selection;
    use crate::models::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chained_ops_apply_in_order() {
        let doc = Document::new(vec![Block::paragraph("hi")]);
        let key = doc.text_order()[0];
        let snapshot = Snapshot::new(doc);

        let next = Transform::new()
            .insert_text(Point::new(key, 2), "!")
            .set_block(BlockType::HeadingOne)
            .apply_to(&snapshot)
            .unwrap();

        let block = next.document.blocks().next().unwrap();
        assert_eq!(block.ty, BlockType::HeadingOne);
        assert_eq!(block.text(), "hi!");
    }

    #[test]
    fn test_failed_op_leaves_input_untouched() {
        let doc = Document::new(vec![Block::paragraph("hi")]);
        let key = doc.text_order()[0];
        let snapshot = Snapshot::new(doc);

        let result = Transform::new()
            .insert_text(Point::new(key, 1), "a")
            .unwrap_block(BlockType::Quote) // nothing to unwrap
            .apply_to(&snapshot);

        assert!(result.is_err());
        assert_eq!(
            snapshot.document.blocks().next().unwrap().text(),
            "hi"
        );
    }

    #[test]
    fn test_wrap_then_unwrap_is_identity_on_content() {
        let doc = Document::new(vec![Block::paragraph("solo")]);
        let snapshot = Snapshot {
            selection: Selection::collapsed(Point::new(doc.text_order()[0], 0)),
            document: doc,
            marks: None,
        };

        let next = Transform::new()
            .wrap_block(BlockType::Quote)
            .unwrap_block(BlockType::Quote)
            .apply_to(&snapshot)
            .unwrap();

        assert_eq!(next.document, snapshot.document);
    }
}

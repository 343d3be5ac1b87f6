pub mod document;
pub mod mdast;

pub use document::{
    Block, BlockType, Data, Document, Fragment, Inline, InlineType, Key, Leaf, MarkType, Node,
    Text,
};
pub use mdast::{AlignKind, MdNode};

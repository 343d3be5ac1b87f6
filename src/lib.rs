pub mod convert;
pub mod editing;
pub mod keymap;
pub mod models;
pub mod schema;

// Re-export key types for easier usage
pub use convert::{document_to_markdown, html_to_fragment, markdown_to_document, parse_markdown, write_markdown};
pub use editing::{Change, Editor, History, Op, Point, Selection, Snapshot, StructuralError, Transform};
pub use keymap::{
    BackspaceConfig, Dispatch, KeyEvent, KeyPress, Keymap, KeymapConfig, SoftBreakConfig,
    StructuralEditor,
};
pub use models::{
    Block, BlockType, Data, Document, Fragment, Inline, InlineType, Key, Leaf, MarkType, MdNode,
    Node, Text,
};
pub use schema::{Field, Plugin, PluginRegistry};

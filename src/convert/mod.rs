//! Tree converters: Markdown AST ⇄ Document AST, markdown source ⇄
//! Markdown AST, and paste HTML → document fragment.
//!
//! All conversions are deterministic synchronous tree walks with no I/O.
//! The round-trip law holds within the supported tag set; anything outside
//! it degrades gracefully (see `markdown`'s module docs).

pub mod html;
pub mod markdown;
pub mod source;

pub use html::html_to_fragment;
pub use markdown::{document_to_markdown, markdown_to_document};
pub use source::{parse_markdown, write_markdown};

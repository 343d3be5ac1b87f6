//! Schema registry: the fixed tag tables shared by the converters, the
//! plugin extension point, and the document-level normalization rule.

pub mod plugins;

pub use plugins::{Field, Plugin, PluginRegistry};

use log::debug;

use crate::editing::{Point, Snapshot};
use crate::models::{Block, BlockType, MarkType, Node};

/// Block tag table: HTML-ish tag name to block type.
pub fn block_type_for_tag(tag: &str) -> Option<BlockType> {
    let ty = match tag {
        "p" => BlockType::Paragraph,
        "li" => BlockType::ListItem,
        "ul" => BlockType::BulletedList,
        "ol" => BlockType::NumberedList,
        "blockquote" => BlockType::Quote,
        "pre" => BlockType::Code,
        "h1" => BlockType::HeadingOne,
        "h2" => BlockType::HeadingTwo,
        "h3" => BlockType::HeadingThree,
        "h4" => BlockType::HeadingFour,
        "h5" => BlockType::HeadingFive,
        "h6" => BlockType::HeadingSix,
        "table" => BlockType::Table,
        "tr" => BlockType::TableRow,
        "td" | "th" => BlockType::TableCell,
        "hr" => BlockType::ThematicBreak,
        "img" => BlockType::Image,
        _ => return None,
    };
    Some(ty)
}

/// Mark tag table: HTML-ish tag name to mark type.
pub fn mark_for_tag(tag: &str) -> Option<MarkType> {
    let mark = match tag {
        "strong" | "b" => MarkType::Bold,
        "em" | "i" => MarkType::Italic,
        "u" => MarkType::Underline,
        "s" | "del" => MarkType::Strikethrough,
        "code" => MarkType::Code,
        _ => return None,
    };
    Some(mark)
}

/// Document-level validity: at least one block child.
pub fn is_document_valid(snapshot: &Snapshot) -> bool {
    snapshot.document.nodes.iter().any(|n| matches!(n, Node::Block(_)))
}

/// Normalization rule: an empty document gains one empty paragraph at index
/// 0 and the cursor moves into it. Runs after every committed transform;
/// idempotent by construction.
pub fn normalize(snapshot: Snapshot) -> Snapshot {
    if is_document_valid(&snapshot) {
        return snapshot;
    }
    debug!("normalize: empty document, inserting default block");
    let mut snapshot = snapshot;
    let block = Block::default_block();
    let text_key = block
        .first_text()
        .map(|t| t.key)
        .unwrap_or(block.key);
    snapshot.document.nodes.insert(0, Node::Block(block));
    snapshot.selection = snapshot.selection.collapse_to(Point::new(text_key, 0));
    snapshot.marks = None;
    snapshot
}

//! Paste HTML → document fragment.
//!
//! A lightweight tag scanner, not a full HTML parser: tag names map through
//! the schema tag tables, `href`/`src`/`alt` attributes carry through,
//! entities decode, and unknown tags are transparent. Good enough for the
//! paste path, which only needs a structure insertable as a fragment.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::models::{Block, BlockType, Data, Fragment, Inline, InlineType, Leaf, MarkType, Node, Text};
use crate::schema::{block_type_for_tag, mark_for_tag};

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("Invalid tag regex")
    })
}

fn name_regex() -> &'static Regex {
    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    NAME_REGEX
        .get_or_init(|| Regex::new(r"^</?\s*([a-zA-Z][a-zA-Z0-9]*)").expect("Invalid name regex"))
}

fn attr_value(tag: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?i){name}\s*=\s*["']([^"']*)["']"#);
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(tag)
        .map(|caps| html_escape::decode_html_entities(&caps[1]).into_owned())
}

/// Parse paste HTML into a fragment of blocks. Never fails: malformed input
/// degrades to whatever structure the scanner can still recover.
pub fn html_to_fragment(html: &str) -> Fragment {
    let mut builder = Builder::default();
    let mut cursor = 0;
    for found in tag_regex().find_iter(html) {
        if found.start() > cursor {
            builder.text(&html[cursor..found.start()]);
        }
        cursor = found.end();
        let tag = found.as_str();
        if tag.starts_with("<!--") {
            continue;
        }
        let Some(name) = name_regex()
            .captures(tag)
            .map(|caps| caps[1].to_lowercase())
        else {
            continue;
        };
        if tag.starts_with("</") {
            builder.close(&name);
        } else {
            builder.open(&name, tag);
        }
    }
    if cursor < html.len() {
        builder.text(&html[cursor..]);
    }
    builder.finish()
}

#[derive(Default)]
struct Builder {
    fragment: Vec<Block>,
    open: Vec<Block>,
    marks: Vec<MarkType>,
    link: Option<Inline>,
    /// Images found inside a leaf block, hoisted after it closes.
    pending: Vec<Block>,
}

/// Block types whose children are inline/text content.
fn is_leaf_capable(ty: &BlockType) -> bool {
    matches!(
        ty,
        BlockType::Paragraph
            | BlockType::Code
            | BlockType::ListItem
            | BlockType::TableCell
            | BlockType::HeadingOne
            | BlockType::HeadingTwo
            | BlockType::HeadingThree
            | BlockType::HeadingFour
            | BlockType::HeadingFive
            | BlockType::HeadingSix
    )
}

impl Builder {
    fn in_code(&self) -> bool {
        self.open
            .last()
            .map(|b| b.ty == BlockType::Code)
            .unwrap_or(false)
    }

    fn mark_set(&self) -> BTreeSet<MarkType> {
        self.marks.iter().copied().collect()
    }

    fn text(&mut self, raw: &str) {
        let decoded = html_escape::decode_html_entities(raw).into_owned();
        let text = if self.in_code() {
            decoded
        } else {
            collapse_whitespace(&decoded)
        };
        if text.trim().is_empty() && self.link.is_none() && !self.leaf_open() {
            return; // inter-block whitespace
        }
        if text.is_empty() {
            return;
        }
        let leaf = Leaf::marked(text, self.mark_set());
        if let Some(link) = &mut self.link {
            append_leaf(&mut link.nodes, leaf);
            return;
        }
        self.ensure_leaf_block();
        if let Some(block) = self.open.last_mut() {
            append_leaf(&mut block.nodes, leaf);
        }
    }

    fn leaf_open(&self) -> bool {
        self.open
            .last()
            .map(|b| is_leaf_capable(&b.ty))
            .unwrap_or(false)
    }

    fn ensure_leaf_block(&mut self) {
        if !self.leaf_open() {
            self.open.push(Block::new(BlockType::Paragraph, Vec::new()));
        }
    }

    fn open(&mut self, name: &str, tag: &str) {
        if self.in_code() && name != "pre" {
            return; // raw content wins inside a code block
        }
        if let Some(mark) = mark_for_tag(name) {
            self.marks.push(mark);
            return;
        }
        match name {
            "a" => {
                self.close("a"); // nested links are invalid, close the old one
                let mut data = Data::new();
                if let Some(href) = attr_value(tag, "href") {
                    data.insert("href".to_string(), Value::String(href));
                }
                self.link = Some(Inline {
                    key: crate::models::Key::new(),
                    ty: InlineType::Link,
                    data,
                    nodes: Vec::new(),
                });
            }
            "br" => self.text("\n"),
            "img" => {
                let mut data = Data::new();
                if let Some(src) = attr_value(tag, "src") {
                    data.insert("src".to_string(), Value::String(src));
                }
                if let Some(alt) = attr_value(tag, "alt") {
                    data.insert("alt".to_string(), Value::String(alt));
                }
                let image = Block::void(BlockType::Image, data);
                if self.leaf_open() {
                    self.pending.push(image);
                } else {
                    self.attach(image);
                }
            }
            "hr" => {
                let rule = Block::void(BlockType::ThematicBreak, Data::new());
                if self.leaf_open() {
                    self.pending.push(rule);
                } else {
                    self.attach(rule);
                }
            }
            _ => match block_type_for_tag(name) {
                Some(ty) => {
                    // A paragraph-like block never contains another block;
                    // list items and table cells may
                    let closable = matches!(
                        self.open.last().map(|b| &b.ty),
                        Some(BlockType::Paragraph | BlockType::Code)
                    ) || self
                        .open
                        .last()
                        .map(|b| b.ty.heading_depth().is_some())
                        .unwrap_or(false);
                    if closable {
                        self.close_top();
                    }
                    self.open.push(Block::new(ty, Vec::new()));
                }
                None => debug!("html_to_fragment: transparent tag <{name}>"),
            },
        }
    }

    fn close(&mut self, name: &str) {
        if let Some(mark) = mark_for_tag(name) {
            if let Some(position) = self.marks.iter().rposition(|&m| m == mark) {
                self.marks.remove(position);
            }
            return;
        }
        if name == "a" {
            if let Some(mut link) = self.link.take() {
                if link.nodes.is_empty() {
                    link.nodes.push(Node::Text(Text::empty()));
                }
                self.ensure_leaf_block();
                if let Some(block) = self.open.last_mut() {
                    block.nodes.push(Node::Inline(link));
                }
            }
            return;
        }
        let Some(ty) = block_type_for_tag(name) else {
            return;
        };
        if !self.open.iter().any(|b| b.ty == ty) {
            return; // stray closing tag
        }
        // Forgiving close: pop until the matching type comes off the stack
        while let Some(top) = self.open.last() {
            let matched = top.ty == ty;
            self.close_top();
            if matched {
                break;
            }
        }
    }

    fn close_top(&mut self) {
        let Some(mut block) = self.open.pop() else {
            return;
        };
        if is_leaf_capable(&block.ty) && !block.nodes.iter().any(|n| matches!(n, Node::Text(_))) {
            block.nodes.push(Node::Text(Text::empty()));
        }
        self.attach(block);
        for pending in std::mem::take(&mut self.pending) {
            self.attach(pending);
        }
    }

    fn attach(&mut self, block: Block) {
        match self.open.last_mut() {
            Some(parent) => parent.nodes.push(Node::Block(block)),
            None => self.fragment.push(block),
        }
    }

    fn finish(mut self) -> Fragment {
        self.close("a");
        while !self.open.is_empty() {
            self.close_top();
        }
        Fragment::new(self.fragment)
    }
}

fn append_leaf(nodes: &mut Vec<Node>, leaf: Leaf) {
    if let Some(Node::Text(text)) = nodes.last_mut() {
        text.ranges.push(leaf);
        text.normalize();
        return;
    }
    nodes.push(Node::Text(Text::new(vec![leaf])));
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

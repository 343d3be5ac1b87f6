//! Markdown AST ⇄ Document AST.
//!
//! Both directions are pure tree walks over the fixed tag mapping. Unknown
//! node kinds never fail the conversion: containers flatten into their
//! children, leaves drop, and either way the gap is logged at debug level.
//! Underline marks have no markdown form and are dropped on the way out;
//! that is a limitation of the format, not an error.

use std::collections::BTreeSet;

use log::debug;
use serde_json::Value;

use crate::models::{
    AlignKind, Block, BlockType, Data, Document, Inline, InlineType, Leaf, MarkType, MdNode, Node,
    Text,
};
use crate::schema::PluginRegistry;

/// Convert a Markdown AST into a document tree.
pub fn markdown_to_document(root: &MdNode, plugins: &PluginRegistry) -> Document {
    let children = match root {
        MdNode::Root { children } => children.as_slice(),
        other => std::slice::from_ref(other),
    };
    let mut blocks = Vec::new();
    for child in children {
        blocks.extend(block_from_md(child, plugins));
    }
    Document::new(blocks)
}

/// Convert a document tree back into a Markdown AST.
pub fn document_to_markdown(document: &Document, plugins: &PluginRegistry) -> MdNode {
    let mut children = Vec::new();
    for block in document.blocks() {
        if let Some(node) = md_from_block(block, plugins) {
            children.push(node);
        }
    }
    MdNode::root(children)
}

// ---------------------------------------------------------------------------
// Markdown AST → document

fn block_from_md(node: &MdNode, plugins: &PluginRegistry) -> Vec<Block> {
    match node {
        MdNode::Paragraph { children } => {
            // A paragraph that is exactly a rendered shortcode line reads
            // back as the plugin's block
            if let Some((id, data)) = plugins.recognize(&node.plain_text()) {
                return vec![Block::void(BlockType::Plugin(id), data)];
            }
            paragraph_blocks(children)
        }
        MdNode::Heading { depth, children } => {
            let ty = BlockType::heading(*depth).unwrap_or(BlockType::Paragraph);
            vec![Block::new(ty, inline_nodes(children))]
        }
        MdNode::List {
            ordered,
            start,
            children,
        } => {
            let ty = if *ordered {
                BlockType::NumberedList
            } else {
                BlockType::BulletedList
            };
            let mut data = Data::new();
            if *ordered {
                if let Some(start) = start {
                    if *start != 1 {
                        data.insert("start".to_string(), Value::from(*start));
                    }
                }
            }
            let items: Vec<Block> = children
                .iter()
                .flat_map(|child| block_from_md(child, plugins))
                .collect();
            vec![Block::container(ty, items).with_data(data)]
        }
        MdNode::ListItem { children } => vec![list_item_from_md(children, plugins)],
        MdNode::Blockquote { children } => {
            let inner: Vec<Block> = children
                .iter()
                .flat_map(|child| block_from_md(child, plugins))
                .collect();
            vec![Block::container(BlockType::Quote, inner)]
        }
        MdNode::Code { lang, value } => {
            let mut data = Data::new();
            if let Some(lang) = lang {
                data.insert("lang".to_string(), Value::String(lang.clone()));
            }
            vec![Block::leaf(BlockType::Code, value.clone()).with_data(data)]
        }
        MdNode::Table { align, children } => {
            let mut data = Data::new();
            if let Some(align) = align {
                let values: Vec<Value> = align
                    .iter()
                    .map(|kind| Value::String(align_to_str(*kind).to_string()))
                    .collect();
                data.insert("align".to_string(), Value::Array(values));
            }
            let rows: Vec<Block> = children
                .iter()
                .flat_map(|child| block_from_md(child, plugins))
                .collect();
            vec![Block::container(BlockType::Table, rows).with_data(data)]
        }
        MdNode::TableRow { children } => {
            let cells: Vec<Block> = children
                .iter()
                .flat_map(|child| block_from_md(child, plugins))
                .collect();
            vec![Block::container(BlockType::TableRow, cells)]
        }
        MdNode::TableCell { children } => {
            vec![Block::new(BlockType::TableCell, inline_nodes(children))]
        }
        MdNode::ThematicBreak => vec![Block::void(BlockType::ThematicBreak, Data::new())],
        MdNode::Image { url, title, alt } => vec![image_block(url, title.as_deref(), alt.as_deref())],
        MdNode::Html { value } => match plugins.recognize(value) {
            Some((id, data)) => vec![Block::void(BlockType::Plugin(id), data)],
            None => {
                debug!("markdown_to_document: dropping unmapped html block");
                Vec::new()
            }
        },
        // Inline content at the top level becomes a paragraph
        inline => paragraph_blocks(std::slice::from_ref(inline)),
    }
}

/// Paragraph conversion hoists images into sibling void blocks: the document
/// model has no inline image.
fn paragraph_blocks(children: &[MdNode]) -> Vec<Block> {
    let mut collector = InlineCollector::default();
    collect_inlines(children, &BTreeSet::new(), &mut collector);
    collector.flush();
    let InlineCollector { nodes, hoisted, .. } = collector;

    let mut blocks = Vec::new();
    let has_content = nodes
        .iter()
        .any(|n| !matches!(n, Node::Text(t) if t.is_empty()));
    if has_content || hoisted.is_empty() {
        let nodes = if nodes.is_empty() {
            vec![Node::Text(Text::empty())]
        } else {
            nodes
        };
        blocks.push(Block::new(BlockType::Paragraph, nodes));
    }
    blocks.extend(hoisted);
    blocks
}

/// A list item keeps its first paragraph's content inline and carries any
/// further blocks (nested lists, extra paragraphs) as block children.
fn list_item_from_md(children: &[MdNode], plugins: &PluginRegistry) -> Block {
    let mut inline: Vec<Node> = Vec::new();
    let mut rest: Vec<Node> = Vec::new();
    for (index, child) in children.iter().enumerate() {
        match child {
            MdNode::Paragraph {
                children: para_children,
            } if index == 0 => {
                inline = inline_nodes(para_children);
            }
            other => {
                for block in block_from_md(other, plugins) {
                    rest.push(Node::Block(block));
                }
            }
        }
    }
    if inline.is_empty() {
        inline.push(Node::Text(Text::empty()));
    }
    inline.extend(rest);
    Block::new(BlockType::ListItem, inline)
}

#[derive(Default)]
struct InlineCollector {
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    hoisted: Vec<Block>,
}

impl InlineCollector {
    fn flush(&mut self) {
        if !self.leaves.is_empty() {
            self.nodes.push(Node::Text(Text::new(std::mem::take(
                &mut self.leaves,
            ))));
        }
    }
}

fn inline_nodes(children: &[MdNode]) -> Vec<Node> {
    let mut collector = InlineCollector::default();
    collect_inlines(children, &BTreeSet::new(), &mut collector);
    collector.flush();
    if collector.nodes.is_empty() {
        collector.nodes.push(Node::Text(Text::empty()));
    }
    // Hoisted images inside structural content (headings, cells) degrade to
    // nothing; paragraphs handle hoisting themselves
    collector.nodes
}

fn collect_inlines(children: &[MdNode], marks: &BTreeSet<MarkType>, out: &mut InlineCollector) {
    for child in children {
        match child {
            MdNode::Text { value } => out.leaves.push(Leaf::marked(value.clone(), marks.clone())),
            MdNode::InlineCode { value } => {
                let mut with_code = marks.clone();
                with_code.insert(MarkType::Code);
                out.leaves.push(Leaf::marked(value.clone(), with_code));
            }
            MdNode::Strong { children } => {
                collect_with(children, marks, MarkType::Bold, out);
            }
            MdNode::Emphasis { children } => {
                collect_with(children, marks, MarkType::Italic, out);
            }
            MdNode::Delete { children } => {
                collect_with(children, marks, MarkType::Strikethrough, out);
            }
            MdNode::Link {
                url,
                title,
                children,
            } => {
                out.flush();
                let mut inner = InlineCollector::default();
                collect_inlines(children, marks, &mut inner);
                inner.flush();
                let mut data = Data::new();
                data.insert("href".to_string(), Value::String(url.clone()));
                if let Some(title) = title {
                    data.insert("title".to_string(), Value::String(title.clone()));
                }
                let nodes = if inner.nodes.is_empty() {
                    vec![Node::Text(Text::empty())]
                } else {
                    inner.nodes
                };
                out.nodes.push(Node::Inline(Inline {
                    key: crate::models::Key::new(),
                    ty: InlineType::Link,
                    data,
                    nodes,
                }));
                out.hoisted.extend(inner.hoisted);
            }
            MdNode::Image { url, title, alt } => {
                out.hoisted
                    .push(image_block(url, title.as_deref(), alt.as_deref()));
            }
            MdNode::Html { value } => {
                // Inline html degrades to its raw text
                out.leaves.push(Leaf::marked(value.clone(), marks.clone()));
            }
            other => {
                if let Some(children) = other.children() {
                    debug!("markdown_to_document: flattening unmapped inline {other:?}");
                    collect_inlines(children, marks, out);
                } else {
                    debug!("markdown_to_document: dropping unmapped inline {other:?}");
                }
            }
        }
    }
}

fn collect_with(
    children: &[MdNode],
    marks: &BTreeSet<MarkType>,
    mark: MarkType,
    out: &mut InlineCollector,
) {
    let mut with = marks.clone();
    with.insert(mark);
    collect_inlines(children, &with, out);
}

fn image_block(url: &str, title: Option<&str>, alt: Option<&str>) -> Block {
    let mut data = Data::new();
    data.insert("src".to_string(), Value::String(url.to_string()));
    if let Some(title) = title {
        data.insert("title".to_string(), Value::String(title.to_string()));
    }
    if let Some(alt) = alt {
        data.insert("alt".to_string(), Value::String(alt.to_string()));
    }
    Block::void(BlockType::Image, data)
}

fn align_to_str(kind: AlignKind) -> &'static str {
    match kind {
        AlignKind::None => "none",
        AlignKind::Left => "left",
        AlignKind::Center => "center",
        AlignKind::Right => "right",
    }
}

fn align_from_str(s: &str) -> AlignKind {
    match s {
        "left" => AlignKind::Left,
        "center" => AlignKind::Center,
        "right" => AlignKind::Right,
        _ => AlignKind::None,
    }
}

// ---------------------------------------------------------------------------
// Document → Markdown AST

fn md_from_block(block: &Block, plugins: &PluginRegistry) -> Option<MdNode> {
    let node = match &block.ty {
        BlockType::Paragraph => MdNode::Paragraph {
            children: md_inlines(&block.nodes),
        },
        ty if ty.heading_depth().is_some() => MdNode::Heading {
            depth: ty.heading_depth().unwrap_or(1),
            children: md_inlines(&block.nodes),
        },
        BlockType::Quote => MdNode::Blockquote {
            children: md_child_blocks(&block.nodes, plugins),
        },
        BlockType::BulletedList => MdNode::List {
            ordered: false,
            start: None,
            children: md_child_blocks(&block.nodes, plugins),
        },
        BlockType::NumberedList => MdNode::List {
            ordered: true,
            start: block.data.get("start").and_then(Value::as_u64),
            children: md_child_blocks(&block.nodes, plugins),
        },
        BlockType::ListItem => {
            let mut children = Vec::new();
            let inline: Vec<&Node> = block
                .nodes
                .iter()
                .filter(|n| !matches!(n, Node::Block(_)))
                .collect();
            let has_inline_content = inline.iter().any(|n| match n {
                Node::Text(t) => !t.is_empty(),
                _ => true,
            });
            if has_inline_content {
                let owned: Vec<Node> = inline.into_iter().cloned().collect();
                children.push(MdNode::paragraph(md_inlines(&owned)));
            }
            for node in &block.nodes {
                if let Node::Block(b) = node {
                    if let Some(md) = md_from_block(b, plugins) {
                        children.push(md);
                    }
                }
            }
            MdNode::ListItem { children }
        }
        BlockType::Code => MdNode::Code {
            lang: block
                .data
                .get("lang")
                .and_then(Value::as_str)
                .map(str::to_string),
            value: block.text(),
        },
        BlockType::Table => MdNode::Table {
            align: block.data.get("align").and_then(Value::as_array).map(|a| {
                a.iter()
                    .map(|v| align_from_str(v.as_str().unwrap_or("none")))
                    .collect()
            }),
            children: md_child_blocks(&block.nodes, plugins),
        },
        BlockType::TableRow => MdNode::TableRow {
            children: md_child_blocks(&block.nodes, plugins),
        },
        BlockType::TableCell => MdNode::TableCell {
            children: md_inlines(&block.nodes),
        },
        BlockType::Image => MdNode::paragraph(vec![MdNode::Image {
            url: data_str(&block.data, "src").unwrap_or_default(),
            title: data_str(&block.data, "title"),
            alt: data_str(&block.data, "alt"),
        }]),
        BlockType::ThematicBreak => MdNode::ThematicBreak,
        BlockType::Plugin(id) => match plugins.get(id) {
            Some(plugin) => MdNode::Html {
                value: plugin.to_block(&block.data),
            },
            None => {
                debug!("document_to_markdown: no plugin registered for id {id:?}");
                return None;
            }
        },
        other => {
            debug!("document_to_markdown: unmapped block type {other}");
            return None;
        }
    };
    Some(node)
}

fn md_child_blocks(nodes: &[Node], plugins: &PluginRegistry) -> Vec<MdNode> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Block(b) => {
                if let Some(md) = md_from_block(b, plugins) {
                    out.push(md);
                }
            }
            // Loose inline content inside a container degrades to a paragraph
            other => out.push(MdNode::paragraph(md_inlines(std::slice::from_ref(other)))),
        }
    }
    out
}

fn md_inlines(nodes: &[Node]) -> Vec<MdNode> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) => {
                for leaf in &text.ranges {
                    if let Some(md) = md_from_leaf(leaf) {
                        out.push(md);
                    }
                }
            }
            Node::Inline(inline) => out.push(md_from_inline(inline)),
            Node::Block(b) => {
                debug!("document_to_markdown: block {} in inline position", b.ty);
                out.extend(md_inlines(&b.nodes));
            }
        }
    }
    out
}

fn md_from_inline(inline: &Inline) -> MdNode {
    match inline.ty {
        InlineType::Link => MdNode::Link {
            url: data_str(&inline.data, "href").unwrap_or_default(),
            title: data_str(&inline.data, "title"),
            children: md_inlines(&inline.nodes),
        },
    }
}

/// Wrap a leaf's text in mark nodes, innermost to outermost: inline code,
/// strikethrough, emphasis, strong. Underline has no markdown form.
fn md_from_leaf(leaf: &Leaf) -> Option<MdNode> {
    if leaf.text.is_empty() {
        return None;
    }
    let mut node = if leaf.marks.contains(&MarkType::Code) {
        MdNode::InlineCode {
            value: leaf.text.clone(),
        }
    } else {
        MdNode::text(leaf.text.clone())
    };
    if leaf.marks.contains(&MarkType::Strikethrough) {
        node = MdNode::Delete {
            children: vec![node],
        };
    }
    if leaf.marks.contains(&MarkType::Italic) {
        node = MdNode::Emphasis {
            children: vec![node],
        };
    }
    if leaf.marks.contains(&MarkType::Bold) {
        node = MdNode::Strong {
            children: vec![node],
        };
    }
    if leaf.marks.contains(&MarkType::Underline) {
        debug!("document_to_markdown: underline mark dropped, no markdown form");
    }
    Some(node)
}

fn data_str(data: &Data, name: &str) -> Option<String> {
    data.get(name).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Plugin};
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use serde_json::json;

    fn no_plugins() -> PluginRegistry {
        PluginRegistry::new()
    }

    fn youtube_registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register(
            Plugin::new("youtube", "YouTube", |data| {
                let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
                format!("{{{{< youtube {id} >}}}}")
            })
            .with_fields(vec![Field::new("id")])
            .with_pattern(
                Regex::new(r"^\{\{<\s*youtube\s+(\S+)\s*>\}\}$").unwrap(),
                |caps| {
                    let mut data = Data::new();
                    data.insert("id".to_string(), json!(&caps[1]));
                    data
                },
            ),
        );
        registry
    }

    // ============ Markdown AST → document ============

    #[test]
    fn test_simple_paragraph_maps_to_one_block() {
        let md = MdNode::root(vec![MdNode::paragraph(vec![MdNode::text("hello")])]);
        let doc = markdown_to_document(&md, &no_plugins());

        assert_eq!(doc.nodes.len(), 1);
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.ty, BlockType::Paragraph);
        assert_eq!(block.nodes.len(), 1);
        let text = block.first_text().unwrap();
        assert_eq!(text.as_string(), "hello");
        assert!(text.ranges.iter().all(|l| l.marks.is_empty()));
    }

    #[test]
    fn test_marks_become_leaf_mark_sets() {
        let md = MdNode::root(vec![MdNode::paragraph(vec![
            MdNode::text("a "),
            MdNode::Strong {
                children: vec![
                    MdNode::text("bold "),
                    MdNode::Emphasis {
                        children: vec![MdNode::text("both")],
                    },
                ],
            },
        ])]);
        let doc = markdown_to_document(&md, &no_plugins());
        let text = doc.blocks().next().unwrap().first_text().unwrap();

        assert_eq!(text.ranges.len(), 3);
        assert!(text.ranges[0].marks.is_empty());
        assert_eq!(
            text.ranges[1].marks,
            [MarkType::Bold].into_iter().collect()
        );
        assert_eq!(
            text.ranges[2].marks,
            [MarkType::Bold, MarkType::Italic].into_iter().collect()
        );
    }

    #[test]
    fn test_nested_lists_nest() {
        let md = MdNode::root(vec![MdNode::List {
            ordered: false,
            start: None,
            children: vec![MdNode::ListItem {
                children: vec![
                    MdNode::paragraph(vec![MdNode::text("outer")]),
                    MdNode::List {
                        ordered: false,
                        start: None,
                        children: vec![MdNode::ListItem {
                            children: vec![MdNode::paragraph(vec![MdNode::text("inner")])],
                        }],
                    },
                ],
            }],
        }]);
        let doc = markdown_to_document(&md, &no_plugins());

        let list = doc.blocks().next().unwrap();
        assert_eq!(list.ty, BlockType::BulletedList);
        let item = list.nodes[0].as_block().unwrap();
        assert_eq!(item.ty, BlockType::ListItem);
        let nested = item
            .nodes
            .iter()
            .find_map(Node::as_block)
            .expect("nested list");
        assert_eq!(nested.ty, BlockType::BulletedList);
    }

    #[test]
    fn test_ordered_list_start_is_kept_when_not_one() {
        let md = MdNode::root(vec![MdNode::List {
            ordered: true,
            start: Some(3),
            children: vec![MdNode::ListItem {
                children: vec![MdNode::paragraph(vec![MdNode::text("x")])],
            }],
        }]);
        let doc = markdown_to_document(&md, &no_plugins());
        let list = doc.blocks().next().unwrap();
        assert_eq!(list.ty, BlockType::NumberedList);
        assert_eq!(list.data.get("start"), Some(&json!(3)));

        let md_one = MdNode::root(vec![MdNode::List {
            ordered: true,
            start: Some(1),
            children: vec![],
        }]);
        let doc_one = markdown_to_document(&md_one, &no_plugins());
        assert!(doc_one.blocks().next().unwrap().data.get("start").is_none());
    }

    #[test]
    fn test_inline_image_is_hoisted_to_void_block() {
        let md = MdNode::root(vec![MdNode::paragraph(vec![
            MdNode::text("before"),
            MdNode::Image {
                url: "cat.png".into(),
                title: None,
                alt: Some("cat".into()),
            },
        ])]);
        let doc = markdown_to_document(&md, &no_plugins());

        let types: Vec<BlockType> = doc.blocks().map(|b| b.ty.clone()).collect();
        assert_eq!(types, vec![BlockType::Paragraph, BlockType::Image]);
        let image = doc.blocks().nth(1).unwrap();
        assert!(image.is_void());
        assert_eq!(image.data.get("src"), Some(&json!("cat.png")));
    }

    #[test]
    fn test_unknown_html_block_is_dropped_not_fatal() {
        let md = MdNode::root(vec![
            MdNode::Html {
                value: "<aside>x</aside>".into(),
            },
            MdNode::paragraph(vec![MdNode::text("kept")]),
        ]);
        let doc = markdown_to_document(&md, &no_plugins());
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.blocks().next().unwrap().text(), "kept");
    }

    #[test]
    fn test_shortcode_html_becomes_plugin_block() {
        let md = MdNode::root(vec![MdNode::Html {
            value: "{{< youtube dQw4w9WgXcQ >}}".into(),
        }]);
        let doc = markdown_to_document(&md, &youtube_registry());
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.ty, BlockType::Plugin("youtube".to_string()));
        assert!(block.is_void());
        assert_eq!(block.data.get("id"), Some(&json!("dQw4w9WgXcQ")));
    }

    #[test]
    fn test_link_becomes_inline_node() {
        let md = MdNode::root(vec![MdNode::paragraph(vec![
            MdNode::text("see "),
            MdNode::Link {
                url: "https://example.com".into(),
                title: None,
                children: vec![MdNode::text("docs")],
            },
        ])]);
        let doc = markdown_to_document(&md, &no_plugins());
        let block = doc.blocks().next().unwrap();
        let inline = block
            .nodes
            .iter()
            .find_map(|n| match n {
                Node::Inline(i) => Some(i),
                _ => None,
            })
            .expect("link inline");
        assert_eq!(inline.ty, InlineType::Link);
        assert_eq!(inline.data.get("href"), Some(&json!("https://example.com")));
    }

    // ============ Document → Markdown AST ============

    #[test]
    fn test_numbered_list_start_round_trips() {
        let mut data = Data::new();
        data.insert("start".to_string(), json!(3));
        let doc = Document::new(vec![Block::container(
            BlockType::NumberedList,
            vec![Block::leaf(BlockType::ListItem, "x")],
        )
        .with_data(data)]);

        let md = document_to_markdown(&doc, &no_plugins());
        let MdNode::Root { children } = &md else {
            panic!("expected root")
        };
        assert_eq!(
            children[0],
            MdNode::List {
                ordered: true,
                start: Some(3),
                children: vec![MdNode::ListItem {
                    children: vec![MdNode::paragraph(vec![MdNode::text("x")])],
                }],
            }
        );
    }

    #[test]
    fn test_plugin_block_serializes_through_to_block() {
        let mut data = Data::new();
        data.insert("id".to_string(), json!("abc"));
        let doc = Document::new(vec![Block::void(
            BlockType::Plugin("youtube".to_string()),
            data,
        )]);

        let md = document_to_markdown(&doc, &youtube_registry());
        let MdNode::Root { children } = &md else {
            panic!("expected root")
        };
        assert_eq!(
            children[0],
            MdNode::Html {
                value: "{{< youtube abc >}}".to_string(),
            }
        );
    }

    #[test]
    fn test_leaf_mark_nesting_order() {
        let doc = Document::new(vec![Block::new(
            BlockType::Paragraph,
            vec![Node::Text(Text::new(vec![Leaf::marked(
                "x",
                [MarkType::Bold, MarkType::Italic].into_iter().collect(),
            )]))],
        )]);
        let md = document_to_markdown(&doc, &no_plugins());
        let MdNode::Root { children } = &md else {
            panic!("expected root")
        };
        assert_eq!(
            children[0],
            MdNode::paragraph(vec![MdNode::Strong {
                children: vec![MdNode::Emphasis {
                    children: vec![MdNode::text("x")],
                }],
            }])
        );
    }

    // ============ Round-trip law ============

    #[test]
    fn test_round_trip_within_supported_tag_set() {
        let md = MdNode::root(vec![
            MdNode::Heading {
                depth: 2,
                children: vec![MdNode::text("Title")],
            },
            MdNode::paragraph(vec![
                MdNode::text("plain "),
                MdNode::Strong {
                    children: vec![MdNode::text("bold")],
                },
            ]),
            MdNode::List {
                ordered: true,
                start: Some(3),
                children: vec![MdNode::ListItem {
                    children: vec![MdNode::paragraph(vec![MdNode::text("item")])],
                }],
            },
            MdNode::Blockquote {
                children: vec![MdNode::paragraph(vec![MdNode::text("quoted")])],
            },
            MdNode::Code {
                lang: Some("rust".into()),
                value: "let x = 1;".into(),
            },
            MdNode::ThematicBreak,
        ]);

        let doc = markdown_to_document(&md, &no_plugins());
        let back = document_to_markdown(&doc, &no_plugins());
        assert_eq!(back, md);
    }

    #[test]
    fn test_shortcode_round_trip_through_markdown() {
        let registry = youtube_registry();
        let md = MdNode::root(vec![MdNode::Html {
            value: "{{< youtube abc >}}".into(),
        }]);
        let doc = markdown_to_document(&md, &registry);
        let back = document_to_markdown(&doc, &registry);
        assert_eq!(back, md);
    }

    #[test]
    fn test_table_round_trip() {
        let md = MdNode::root(vec![MdNode::Table {
            align: Some(vec![AlignKind::Left, AlignKind::Right]),
            children: vec![
                MdNode::TableRow {
                    children: vec![
                        MdNode::TableCell {
                            children: vec![MdNode::text("a")],
                        },
                        MdNode::TableCell {
                            children: vec![MdNode::text("b")],
                        },
                    ],
                },
                MdNode::TableRow {
                    children: vec![
                        MdNode::TableCell {
                            children: vec![MdNode::text("1")],
                        },
                        MdNode::TableCell {
                            children: vec![MdNode::text("2")],
                        },
                    ],
                },
            ],
        }]);

        let doc = markdown_to_document(&md, &no_plugins());
        let table = doc.blocks().next().unwrap();
        assert_eq!(table.ty, BlockType::Table);
        assert_eq!(table.nodes.len(), 2);

        let back = document_to_markdown(&doc, &no_plugins());
        assert_eq!(back, md);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let md = MdNode::root(vec![MdNode::paragraph(vec![
            MdNode::text("a "),
            MdNode::Strong {
                children: vec![MdNode::text("b")],
            },
        ])]);
        let one = markdown_to_document(&md, &no_plugins());
        let two = markdown_to_document(&md, &no_plugins());
        assert_eq!(one, two);
    }
}

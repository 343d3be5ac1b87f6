//! Markdown source text ⇄ Markdown AST.
//!
//! Parsing walks the pulldown-cmark event stream with an explicit frame
//! stack (every `Start` pushes a frame, every `End` pops one, so the stack
//! stays balanced whatever the tag). Writing emits CommonMark plus GFM
//! tables/strikethrough. The pair is lossy only outside the supported
//! construct set.

use log::debug;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag};

use crate::models::{AlignKind, MdNode};

#[derive(Debug)]
enum FrameKind {
    Root,
    Paragraph,
    Heading(u8),
    List { ordered: bool, start: Option<u64> },
    Item,
    Blockquote,
    Code { lang: Option<String> },
    Table { align: Vec<AlignKind> },
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link { url: String, title: Option<String> },
    Image { url: String, title: Option<String> },
    HtmlBlock,
    /// Unsupported container: children pass through to the parent.
    Transparent,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    children: Vec<MdNode>,
    literal: String,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            children: Vec::new(),
            literal: String::new(),
        }
    }

    fn push(&mut self, node: MdNode) {
        // Coalesce adjacent text so soft breaks don't fragment paragraphs
        if let (Some(MdNode::Text { value: prev }), MdNode::Text { value }) =
            (self.children.last_mut(), &node)
        {
            prev.push_str(value);
            return;
        }
        self.children.push(node);
    }
}

fn top<'a>(root: &'a mut Frame, stack: &'a mut Vec<Frame>) -> &'a mut Frame {
    stack.last_mut().unwrap_or(root)
}

/// Parse markdown source into a Markdown AST root.
pub fn parse_markdown(source: &str) -> MdNode {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(source, options);

    let mut root = Frame::new(FrameKind::Root);
    let mut stack: Vec<Frame> = Vec::new();
    for event in parser {
        match event {
            Event::Start(tag) => stack.push(Frame::new(frame_kind_for(tag))),
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close_frame(frame, top(&mut root, &mut stack));
                }
            }
            Event::Text(text) => {
                let frame = top(&mut root, &mut stack);
                match frame.kind {
                    FrameKind::Code { .. } | FrameKind::HtmlBlock => {
                        frame.literal.push_str(&text)
                    }
                    _ => frame.push(MdNode::text(text.into_string())),
                }
            }
            Event::Code(code) => {
                top(&mut root, &mut stack).push(MdNode::InlineCode {
                    value: code.into_string(),
                });
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let frame = top(&mut root, &mut stack);
                match frame.kind {
                    FrameKind::HtmlBlock => frame.literal.push_str(&html),
                    _ => frame.push(MdNode::Html {
                        value: html.trim_end_matches('\n').to_string(),
                    }),
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                top(&mut root, &mut stack).push(MdNode::text("\n"));
            }
            Event::Rule => {
                top(&mut root, &mut stack).push(MdNode::ThematicBreak);
            }
            Event::TaskListMarker(_) => {}
            other => {
                debug!("parse_markdown: ignoring unsupported event {other:?}");
            }
        }
    }

    // Unterminated input still resolves: close whatever is left open
    while let Some(frame) = stack.pop() {
        close_frame(frame, top(&mut root, &mut stack));
    }
    MdNode::root(root.children)
}

fn frame_kind_for(tag: Tag<'_>) -> FrameKind {
    match tag {
        Tag::Paragraph => FrameKind::Paragraph,
        Tag::Heading { level, .. } => FrameKind::Heading(level as u8),
        Tag::List(start) => FrameKind::List {
            ordered: start.is_some(),
            start,
        },
        Tag::Item => FrameKind::Item,
        Tag::BlockQuote(_) => FrameKind::Blockquote,
        Tag::CodeBlock(kind) => FrameKind::Code {
            lang: match kind {
                CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.into_string()),
                _ => None,
            },
        },
        Tag::Table(alignments) => FrameKind::Table {
            align: alignments.iter().map(|a| align_kind(*a)).collect(),
        },
        Tag::TableHead => FrameKind::TableHead,
        Tag::TableRow => FrameKind::TableRow,
        Tag::TableCell => FrameKind::TableCell,
        Tag::Emphasis => FrameKind::Emphasis,
        Tag::Strong => FrameKind::Strong,
        Tag::Strikethrough => FrameKind::Strikethrough,
        Tag::Link {
            dest_url, title, ..
        } => FrameKind::Link {
            url: dest_url.into_string(),
            title: none_if_empty(title.into_string()),
        },
        Tag::Image {
            dest_url, title, ..
        } => FrameKind::Image {
            url: dest_url.into_string(),
            title: none_if_empty(title.into_string()),
        },
        Tag::HtmlBlock => FrameKind::HtmlBlock,
        _ => FrameKind::Transparent,
    }
}

fn close_frame(frame: Frame, parent: &mut Frame) {
    let Frame {
        kind,
        children,
        literal,
    } = frame;
    let node = match kind {
        FrameKind::Root => unreachable!("root frame is never closed"),
        FrameKind::Paragraph => MdNode::Paragraph { children },
        FrameKind::Heading(depth) => MdNode::Heading { depth, children },
        FrameKind::List { ordered, start } => MdNode::List {
            ordered,
            start: if ordered { start } else { None },
            children,
        },
        FrameKind::Item => MdNode::ListItem {
            children: wrap_tight_item(children),
        },
        FrameKind::Blockquote => MdNode::Blockquote { children },
        FrameKind::Code { lang } => MdNode::Code {
            lang,
            value: literal.trim_end_matches('\n').to_string(),
        },
        FrameKind::Table { align } => MdNode::Table {
            align: Some(align),
            children,
        },
        FrameKind::TableHead | FrameKind::TableRow => MdNode::TableRow { children },
        FrameKind::TableCell => MdNode::TableCell { children },
        FrameKind::Emphasis => MdNode::Emphasis { children },
        FrameKind::Strong => MdNode::Strong { children },
        FrameKind::Strikethrough => MdNode::Delete { children },
        FrameKind::Link { url, title } => MdNode::Link {
            url,
            title,
            children,
        },
        FrameKind::Image { url, title } => {
            let alt = MdNode::paragraph(children).plain_text();
            MdNode::Image {
                url,
                title,
                alt: none_if_empty(alt),
            }
        }
        FrameKind::HtmlBlock => MdNode::Html {
            value: literal.trim_end_matches('\n').to_string(),
        },
        FrameKind::Transparent => {
            for child in children {
                parent.push(child);
            }
            return;
        }
    };
    parent.push(node);
}

/// Tight list items arrive without a paragraph wrapper; give them one so
/// the AST shape is canonical.
fn wrap_tight_item(children: Vec<MdNode>) -> Vec<MdNode> {
    let mut wrapped = Vec::new();
    let mut inline_run = Vec::new();
    for child in children {
        if is_inline(&child) {
            inline_run.push(child);
        } else {
            if !inline_run.is_empty() {
                wrapped.push(MdNode::paragraph(std::mem::take(&mut inline_run)));
            }
            wrapped.push(child);
        }
    }
    if !inline_run.is_empty() {
        wrapped.push(MdNode::paragraph(inline_run));
    }
    wrapped
}

fn is_inline(node: &MdNode) -> bool {
    matches!(
        node,
        MdNode::Text { .. }
            | MdNode::Emphasis { .. }
            | MdNode::Strong { .. }
            | MdNode::Delete { .. }
            | MdNode::InlineCode { .. }
            | MdNode::Link { .. }
            | MdNode::Image { .. }
    )
}

fn align_kind(alignment: Alignment) -> AlignKind {
    match alignment {
        Alignment::None => AlignKind::None,
        Alignment::Left => AlignKind::Left,
        Alignment::Center => AlignKind::Center,
        Alignment::Right => AlignKind::Right,
    }
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// ---------------------------------------------------------------------------
// Writer

/// Serialize a Markdown AST back to markdown source.
pub fn write_markdown(root: &MdNode) -> String {
    let blocks = match root {
        MdNode::Root { children } => children.as_slice(),
        other => std::slice::from_ref(other),
    };
    let rendered: Vec<String> = blocks.iter().map(block_to_string).collect();
    let mut out = rendered.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn block_to_string(node: &MdNode) -> String {
    match node {
        MdNode::Paragraph { children } => inlines_to_string(children),
        MdNode::Heading { depth, children } => {
            format!(
                "{} {}",
                "#".repeat(usize::from(*depth).clamp(1, 6)),
                inlines_to_string(children)
            )
        }
        MdNode::Blockquote { children } => {
            let inner: Vec<String> = children.iter().map(block_to_string).collect();
            prefix_lines(&inner.join("\n\n"), "> ")
        }
        MdNode::List {
            ordered,
            start,
            children,
        } => list_to_string(*ordered, *start, children),
        MdNode::ListItem { children } => {
            let inner: Vec<String> = children.iter().map(block_to_string).collect();
            inner.join("\n\n")
        }
        MdNode::Code { lang, value } => {
            format!("```{}\n{}\n```", lang.as_deref().unwrap_or(""), value)
        }
        MdNode::Table { align, children } => table_to_string(align.as_deref(), children),
        MdNode::ThematicBreak => "---".to_string(),
        MdNode::Html { value } => value.clone(),
        // Inline content at the top level renders as a loose paragraph
        other => inlines_to_string(std::slice::from_ref(other)),
    }
}

fn list_to_string(ordered: bool, start: Option<u64>, items: &[MdNode]) -> String {
    let mut lines = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let marker = if ordered {
            format!("{}. ", start.unwrap_or(1) + index as u64)
        } else {
            "- ".to_string()
        };
        let body = block_to_string(item);
        let indent = " ".repeat(marker.len());
        let mut rendered = String::new();
        for (line_index, line) in body.lines().enumerate() {
            if line_index == 0 {
                rendered.push_str(&marker);
            } else {
                rendered.push('\n');
                if !line.is_empty() {
                    rendered.push_str(&indent);
                }
            }
            rendered.push_str(line);
        }
        if body.is_empty() {
            rendered.push_str(marker.trim_end());
        }
        lines.push(rendered);
    }
    lines.join("\n")
}

fn table_to_string(align: Option<&[AlignKind]>, rows: &[MdNode]) -> String {
    let render_row = |row: &MdNode| -> String {
        let cells = row.children().unwrap_or(&[]);
        let rendered: Vec<String> = cells
            .iter()
            .map(|cell| inlines_to_string(cell.children().unwrap_or(&[])))
            .collect();
        format!("| {} |", rendered.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let columns = rows
        .first()
        .and_then(MdNode::children)
        .map(<[MdNode]>::len)
        .unwrap_or(0);
    for (index, row) in rows.iter().enumerate() {
        lines.push(render_row(row));
        if index == 0 {
            let divider: Vec<&str> = (0..columns)
                .map(|i| match align.and_then(|a| a.get(i)) {
                    Some(AlignKind::Left) => ":---",
                    Some(AlignKind::Center) => ":---:",
                    Some(AlignKind::Right) => "---:",
                    _ => "---",
                })
                .collect();
            lines.push(format!("| {} |", divider.join(" | ")));
        }
    }
    lines.join("\n")
}

fn inlines_to_string(nodes: &[MdNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            MdNode::Text { value } => out.push_str(value),
            MdNode::Strong { children } => {
                out.push_str("**");
                out.push_str(&inlines_to_string(children));
                out.push_str("**");
            }
            MdNode::Emphasis { children } => {
                out.push('*');
                out.push_str(&inlines_to_string(children));
                out.push('*');
            }
            MdNode::Delete { children } => {
                out.push_str("~~");
                out.push_str(&inlines_to_string(children));
                out.push_str("~~");
            }
            MdNode::InlineCode { value } => {
                out.push('`');
                out.push_str(value);
                out.push('`');
            }
            MdNode::Link {
                url,
                title,
                children,
            } => {
                out.push('[');
                out.push_str(&inlines_to_string(children));
                out.push_str("](");
                out.push_str(url);
                if let Some(title) = title {
                    out.push_str(&format!(" \"{title}\""));
                }
                out.push(')');
            }
            MdNode::Image { url, title, alt } => {
                out.push_str("![");
                out.push_str(alt.as_deref().unwrap_or(""));
                out.push_str("](");
                out.push_str(url);
                if let Some(title) = title {
                    out.push_str(&format!(" \"{title}\""));
                }
                out.push(')');
            }
            MdNode::Html { value } => out.push_str(value),
            other => {
                debug!("write_markdown: block node {other:?} in inline position");
                out.push_str(&other.plain_text());
            }
        }
    }
    out
}

fn prefix_lines(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                prefix.trim_end().to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

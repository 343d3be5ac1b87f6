use serde::{Deserialize, Serialize};

/// A node of the Markdown AST.
///
/// Field and variant naming follows mdast (`listItem`, `inlineCode`,
/// `thematicBreak`) so the serialized form matches what external tooling
/// expects. Trees are ephemeral: created fresh per conversion call and never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MdNode {
    Root {
        children: Vec<MdNode>,
    },
    Paragraph {
        children: Vec<MdNode>,
    },
    Heading {
        depth: u8,
        children: Vec<MdNode>,
    },
    List {
        ordered: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<u64>,
        children: Vec<MdNode>,
    },
    ListItem {
        children: Vec<MdNode>,
    },
    Blockquote {
        children: Vec<MdNode>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        value: String,
    },
    Table {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        align: Option<Vec<AlignKind>>,
        children: Vec<MdNode>,
    },
    TableRow {
        children: Vec<MdNode>,
    },
    TableCell {
        children: Vec<MdNode>,
    },
    ThematicBreak,
    Text {
        value: String,
    },
    Emphasis {
        children: Vec<MdNode>,
    },
    Strong {
        children: Vec<MdNode>,
    },
    Delete {
        children: Vec<MdNode>,
    },
    InlineCode {
        value: String,
    },
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        children: Vec<MdNode>,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    /// Raw markdown/HTML passed through opaquely. Shortcode blocks serialize
    /// into this node kind.
    Html {
        value: String,
    },
}

/// Column alignment of a GFM table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignKind {
    None,
    Left,
    Center,
    Right,
}

impl MdNode {
    pub fn root(children: Vec<MdNode>) -> Self {
        MdNode::Root { children }
    }

    pub fn text(value: impl Into<String>) -> Self {
        MdNode::Text {
            value: value.into(),
        }
    }

    pub fn paragraph(children: Vec<MdNode>) -> Self {
        MdNode::Paragraph { children }
    }

    /// An empty document sentinel: a root with no children.
    pub fn empty() -> Self {
        MdNode::root(Vec::new())
    }

    pub fn children(&self) -> Option<&[MdNode]> {
        match self {
            MdNode::Root { children }
            | MdNode::Paragraph { children }
            | MdNode::Heading { children, .. }
            | MdNode::List { children, .. }
            | MdNode::ListItem { children }
            | MdNode::Blockquote { children }
            | MdNode::Table { children, .. }
            | MdNode::TableRow { children }
            | MdNode::TableCell { children }
            | MdNode::Emphasis { children }
            | MdNode::Strong { children }
            | MdNode::Delete { children }
            | MdNode::Link { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Concatenated plain text of this subtree.
    pub fn plain_text(&self) -> String {
        fn rec(node: &MdNode, out: &mut String) {
            match node {
                MdNode::Text { value }
                | MdNode::InlineCode { value }
                | MdNode::Code { value, .. }
                | MdNode::Html { value } => out.push_str(value),
                other => {
                    if let Some(children) = other.children() {
                        for child in children {
                            rec(child, out);
                        }
                    }
                }
            }
        }
        let mut out = String::new();
        rec(self, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_serialized_form_uses_mdast_names() {
        let node = MdNode::List {
            ordered: true,
            start: Some(3),
            children: vec![MdNode::ListItem {
                children: vec![MdNode::paragraph(vec![MdNode::text("x")])],
            }],
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "list");
        assert_eq!(json["start"], 3);
        assert_eq!(json["children"][0]["type"], "listItem");
        assert_eq!(json["children"][0]["children"][0]["type"], "paragraph");
    }

    #[test]
    fn test_inline_code_and_thematic_break_tags() {
        let code = serde_json::to_value(MdNode::InlineCode {
            value: "x".into(),
        })
        .unwrap();
        assert_eq!(code["type"], "inlineCode");
        let rule = serde_json::to_value(MdNode::ThematicBreak).unwrap();
        assert_eq!(rule["type"], "thematicBreak");
    }

    #[test]
    fn test_plain_text_walks_subtree() {
        let node = MdNode::paragraph(vec![
            MdNode::text("a "),
            MdNode::Strong {
                children: vec![MdNode::text("b")],
            },
        ]);
        assert_eq!(node.plain_text(), "a b");
    }

    #[test]
    fn test_json_round_trip() {
        let node = MdNode::root(vec![
            MdNode::Heading {
                depth: 2,
                children: vec![MdNode::text("hi")],
            },
            MdNode::ThematicBreak,
        ]);
        let json = serde_json::to_string(&node).unwrap();
        let back: MdNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable identity for a node in the document tree.
///
/// Keys are identity, not content: node equality ignores them, and the raw
/// serialized tree omits them (fresh keys are minted on deserialize).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Key(Uuid);

impl Key {
    pub fn new() -> Self {
        Key(Uuid::new_v4())
    }
}

impl Default for Key {
    fn default() -> Self {
        Key::new()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Arbitrary per-node attributes (link href, image src, list start, plugin
/// field values). BTreeMap keeps serialization deterministic.
pub type Data = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownType(String);

/// Block-level node types.
///
/// The set is closed except for `Plugin`, the extension point for
/// shortcode blocks contributed by an external plugin registry. A plugin
/// block's id lives here, in the type itself, not in `data`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockType {
    Paragraph,
    HeadingOne,
    HeadingTwo,
    HeadingThree,
    HeadingFour,
    HeadingFive,
    HeadingSix,
    ListItem,
    BulletedList,
    NumberedList,
    Quote,
    Code,
    Table,
    TableRow,
    TableCell,
    Image,
    ThematicBreak,
    Plugin(String),
}

impl BlockType {
    /// Void blocks carry no editable text (the cursor can sit on them but
    /// not type into them).
    pub fn is_void(&self) -> bool {
        matches!(
            self,
            BlockType::Image | BlockType::ThematicBreak | BlockType::Plugin(_)
        )
    }

    /// Container blocks hold other blocks rather than inline content.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BlockType::BulletedList
                | BlockType::NumberedList
                | BlockType::Quote
                | BlockType::Table
                | BlockType::TableRow
        )
    }

    pub fn heading(depth: u8) -> Option<BlockType> {
        match depth {
            1 => Some(BlockType::HeadingOne),
            2 => Some(BlockType::HeadingTwo),
            3 => Some(BlockType::HeadingThree),
            4 => Some(BlockType::HeadingFour),
            5 => Some(BlockType::HeadingFive),
            6 => Some(BlockType::HeadingSix),
            _ => None,
        }
    }

    pub fn heading_depth(&self) -> Option<u8> {
        match self {
            BlockType::HeadingOne => Some(1),
            BlockType::HeadingTwo => Some(2),
            BlockType::HeadingThree => Some(3),
            BlockType::HeadingFour => Some(4),
            BlockType::HeadingFive => Some(5),
            BlockType::HeadingSix => Some(6),
            _ => None,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockType::Paragraph => "paragraph",
            BlockType::HeadingOne => "heading-one",
            BlockType::HeadingTwo => "heading-two",
            BlockType::HeadingThree => "heading-three",
            BlockType::HeadingFour => "heading-four",
            BlockType::HeadingFive => "heading-five",
            BlockType::HeadingSix => "heading-six",
            BlockType::ListItem => "list-item",
            BlockType::BulletedList => "bulleted-list",
            BlockType::NumberedList => "numbered-list",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Table => "table",
            BlockType::TableRow => "table-row",
            BlockType::TableCell => "table-cell",
            BlockType::Image => "image",
            BlockType::ThematicBreak => "thematic-break",
            BlockType::Plugin(id) => return write!(f, "plugin_{id}"),
        };
        f.write_str(s)
    }
}

impl FromStr for BlockType {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("plugin_") {
            return Ok(BlockType::Plugin(id.to_string()));
        }
        let ty = match s {
            "paragraph" => BlockType::Paragraph,
            "heading-one" => BlockType::HeadingOne,
            "heading-two" => BlockType::HeadingTwo,
            "heading-three" => BlockType::HeadingThree,
            "heading-four" => BlockType::HeadingFour,
            "heading-five" => BlockType::HeadingFive,
            "heading-six" => BlockType::HeadingSix,
            "list-item" => BlockType::ListItem,
            "bulleted-list" => BlockType::BulletedList,
            "numbered-list" => BlockType::NumberedList,
            "quote" => BlockType::Quote,
            "code" => BlockType::Code,
            "table" => BlockType::Table,
            "table-row" => BlockType::TableRow,
            "table-cell" => BlockType::TableCell,
            "image" => BlockType::Image,
            "thematic-break" => BlockType::ThematicBreak,
            other => return Err(UnknownType(other.to_string())),
        };
        Ok(ty)
    }
}

impl Serialize for BlockType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Inline node types. `link` is the only closed inline kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineType {
    Link,
}

/// Character-level formatting marks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkType {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

/// A run of characters sharing one set of marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub marks: BTreeSet<MarkType>,
}

impl Leaf {
    pub fn plain(text: impl Into<String>) -> Self {
        Leaf {
            text: text.into(),
            marks: BTreeSet::new(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: BTreeSet<MarkType>) -> Self {
        Leaf {
            text: text.into(),
            marks,
        }
    }
}

/// A text node: an ordered sequence of leaves. Offsets into a text node are
/// char offsets across the concatenated leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Text {
    #[serde(skip)]
    pub key: Key,
    pub ranges: Vec<Leaf>,
}

impl PartialEq for Text {
    fn eq(&self, other: &Self) -> bool {
        self.ranges == other.ranges
    }
}

impl Eq for Text {}

impl Text {
    pub fn new(ranges: Vec<Leaf>) -> Self {
        let mut text = Text {
            key: Key::new(),
            ranges,
        };
        text.normalize();
        text
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Text::new(vec![Leaf::plain(text)])
    }

    pub fn empty() -> Self {
        Text::plain("")
    }

    /// Total char length across leaves.
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|l| char_count(&l.text)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(|l| l.text.is_empty())
    }

    pub fn as_string(&self) -> String {
        self.ranges.iter().map(|l| l.text.as_str()).collect()
    }

    /// Marks at a char offset: the leaf ending at the offset wins, so typing
    /// after marked text continues the mark.
    pub fn marks_at(&self, offset: usize) -> BTreeSet<MarkType> {
        let mut pos = 0;
        for leaf in &self.ranges {
            let len = char_count(&leaf.text);
            if offset <= pos + len && (offset > pos || offset == 0) {
                return leaf.marks.clone();
            }
            pos += len;
        }
        self.ranges
            .last()
            .map(|l| l.marks.clone())
            .unwrap_or_default()
    }

    /// Insert text at a char offset. `marks` overrides the inherited marks of
    /// the leaf containing the offset. Offsets past the end append.
    pub fn insert(&mut self, offset: usize, text: &str, marks: Option<BTreeSet<MarkType>>) {
        let marks = marks.unwrap_or_else(|| self.marks_at(offset));
        let mut out = Vec::with_capacity(self.ranges.len() + 2);
        let mut pos = 0;
        let mut placed = false;
        for leaf in self.ranges.drain(..) {
            let len = char_count(&leaf.text);
            if !placed && offset <= pos + len {
                let (left, right) = split_at_char(&leaf.text, offset.saturating_sub(pos));
                out.push(Leaf::marked(left, leaf.marks.clone()));
                out.push(Leaf::marked(text, marks.clone()));
                out.push(Leaf::marked(right, leaf.marks));
                placed = true;
            } else {
                out.push(leaf);
            }
            pos += len;
        }
        if !placed {
            out.push(Leaf::marked(text, marks));
        }
        self.ranges = out;
        self.normalize();
    }

    /// Delete a char range, clamped to the text length.
    pub fn delete(&mut self, start: usize, end: usize) {
        let mut out = Vec::with_capacity(self.ranges.len());
        let mut pos = 0;
        for leaf in self.ranges.drain(..) {
            let len = char_count(&leaf.text);
            let cut_start = start.clamp(pos, pos + len) - pos;
            let cut_end = end.clamp(pos, pos + len) - pos;
            if cut_start >= cut_end {
                out.push(leaf);
            } else {
                let (left, rest) = split_at_char(&leaf.text, cut_start);
                let (_, right) = split_at_char(rest, cut_end - cut_start);
                let mut kept = String::with_capacity(left.len() + right.len());
                kept.push_str(left);
                kept.push_str(right);
                out.push(Leaf::marked(kept, leaf.marks));
            }
            pos += len;
        }
        self.ranges = out;
        self.normalize();
    }

    /// Apply a mark-set edit to every leaf segment inside a char range,
    /// splitting leaves at the range boundaries.
    pub fn map_marks(&mut self, start: usize, end: usize, f: impl Fn(&mut BTreeSet<MarkType>)) {
        let mut out = Vec::with_capacity(self.ranges.len() + 2);
        let mut pos = 0;
        for leaf in self.ranges.drain(..) {
            let len = char_count(&leaf.text);
            let seg_start = start.clamp(pos, pos + len) - pos;
            let seg_end = end.clamp(pos, pos + len) - pos;
            if seg_start >= seg_end {
                out.push(leaf);
            } else {
                let (left, rest) = split_at_char(&leaf.text, seg_start);
                let (mid, right) = split_at_char(rest, seg_end - seg_start);
                if !left.is_empty() {
                    out.push(Leaf::marked(left, leaf.marks.clone()));
                }
                let mut marks = leaf.marks.clone();
                f(&mut marks);
                out.push(Leaf::marked(mid, marks));
                if !right.is_empty() {
                    out.push(Leaf::marked(right, leaf.marks));
                }
            }
            pos += len;
        }
        self.ranges = out;
        self.normalize();
    }

    /// Marks present on every char of a non-empty range; `None` when the
    /// range covers no text.
    pub fn common_marks(&self, start: usize, end: usize) -> Option<BTreeSet<MarkType>> {
        let mut common: Option<BTreeSet<MarkType>> = None;
        let mut pos = 0;
        for leaf in &self.ranges {
            let len = char_count(&leaf.text);
            let seg_start = start.clamp(pos, pos + len);
            let seg_end = end.clamp(pos, pos + len);
            if seg_start < seg_end {
                common = Some(match common {
                    None => leaf.marks.clone(),
                    Some(prev) => prev.intersection(&leaf.marks).copied().collect(),
                });
            }
            pos += len;
        }
        common
    }

    /// Merge adjacent leaves with identical marks and drop empty leaves,
    /// keeping a single empty leaf when no text remains.
    pub fn normalize(&mut self) {
        let mut out: Vec<Leaf> = Vec::with_capacity(self.ranges.len());
        for leaf in self.ranges.drain(..) {
            if leaf.text.is_empty() {
                continue;
            }
            match out.last_mut() {
                Some(prev) if prev.marks == leaf.marks => prev.text.push_str(&leaf.text),
                _ => out.push(leaf),
            }
        }
        if out.is_empty() {
            out.push(Leaf::plain(""));
        }
        self.ranges = out;
    }
}

/// A block node. Children are either blocks (containers: lists, quote,
/// table) or an inline/text mix (leaf blocks). Void blocks keep one empty
/// text child so a collapsed selection can sit on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(skip)]
    pub key: Key,
    #[serde(rename = "type")]
    pub ty: BlockType,
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.data == other.data && self.nodes == other.nodes
    }
}

impl Eq for Block {}

impl Block {
    pub fn new(ty: BlockType, nodes: Vec<Node>) -> Self {
        Block {
            key: Key::new(),
            ty,
            data: Data::new(),
            nodes,
        }
    }

    /// A leaf block holding a single plain text node.
    pub fn leaf(ty: BlockType, text: impl Into<String>) -> Self {
        Block::new(ty, vec![Node::Text(Text::plain(text))])
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::leaf(BlockType::Paragraph, text)
    }

    /// The default block inserted by normalization and keymap rules.
    pub fn default_block() -> Self {
        Block::paragraph("")
    }

    /// A void block: no editable content, one empty text child.
    pub fn void(ty: BlockType, data: Data) -> Self {
        Block::new(ty, vec![Node::Text(Text::empty())]).with_data(data)
    }

    pub fn container(ty: BlockType, children: Vec<Block>) -> Self {
        Block::new(ty, children.into_iter().map(Node::Block).collect())
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    pub fn is_void(&self) -> bool {
        self.ty.is_void()
    }

    /// Concatenated text of all descendant leaves.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.nodes, &mut out);
        out
    }

    /// First descendant text node, depth first.
    pub fn first_text(&self) -> Option<&Text> {
        first_text_in(&self.nodes)
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(&t.as_string()),
            Node::Block(b) => collect_text(&b.nodes, out),
            Node::Inline(i) => collect_text(&i.nodes, out),
        }
    }
}

fn first_text_in(nodes: &[Node]) -> Option<&Text> {
    for node in nodes {
        match node {
            Node::Text(t) => return Some(t),
            Node::Block(b) => {
                if let Some(t) = first_text_in(&b.nodes) {
                    return Some(t);
                }
            }
            Node::Inline(i) => {
                if let Some(t) = first_text_in(&i.nodes) {
                    return Some(t);
                }
            }
        }
    }
    None
}

/// An inline node (a link) wrapping further inline/text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inline {
    #[serde(skip)]
    pub key: Key,
    #[serde(rename = "type")]
    pub ty: InlineType,
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl PartialEq for Inline {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.data == other.data && self.nodes == other.nodes
    }
}

impl Eq for Inline {}

impl Inline {
    pub fn link(href: impl Into<String>, text: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert("href".to_string(), Value::String(href.into()));
        Inline {
            key: Key::new(),
            ty: InlineType::Link,
            data,
            nodes: vec![Node::Text(Text::plain(text))],
        }
    }
}

/// Any non-document node in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Block(Block),
    Inline(Inline),
    Text(Text),
}

impl Node {
    pub fn key(&self) -> Key {
        match self {
            Node::Block(b) => b.key,
            Node::Inline(i) => i.key,
            Node::Text(t) => t.key,
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Block(b) => Some(&b.nodes),
            Node::Inline(i) => Some(&i.nodes),
            Node::Text(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Block(b) => Some(&mut b.nodes),
            Node::Inline(i) => Some(&mut i.nodes),
            Node::Text(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Node::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut Text> {
        match self {
            Node::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// A run of blocks with no enclosing document, produced by the HTML paste
/// converter and consumed by `InsertFragment`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    pub nodes: Vec<Block>,
}

impl Fragment {
    pub fn new(nodes: Vec<Block>) -> Self {
        Fragment { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The document root. Children are blocks by construction; the schema's
/// normalization rule guarantees at least one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    pub key: Key,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for Document {}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Document {
            key: Key::new(),
            nodes: blocks.into_iter().map(Node::Block).collect(),
        }
    }

    pub fn empty() -> Self {
        Document::new(Vec::new())
    }

    /// Top-level blocks in order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.nodes.iter().filter_map(Node::as_block)
    }

    /// Serialize to the raw tree form: kind-tagged JSON without keys.
    pub fn to_raw(&self) -> anyhow::Result<String> {
        let value = serde_json::json!({ "kind": "document", "nodes": &self.nodes });
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Deserialize a raw tree. Nodes get fresh keys.
    pub fn from_raw(raw: &str) -> anyhow::Result<Document> {
        #[derive(Deserialize)]
        struct Raw {
            kind: String,
            #[serde(default)]
            nodes: Vec<Node>,
        }
        let parsed: Raw = serde_json::from_str(raw)?;
        anyhow::ensure!(
            parsed.kind == "document",
            "raw tree root must be a document, got {:?}",
            parsed.kind
        );
        Ok(Document {
            key: Key::new(),
            nodes: parsed.nodes,
        })
    }

    /// Child-index path from the root to the node with this key. The
    /// document's own key yields the empty path.
    pub fn find_path(&self, key: Key) -> Option<Vec<usize>> {
        if key == self.key {
            return Some(Vec::new());
        }
        let mut path = Vec::new();
        if find_in(&self.nodes, key, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.find_path(key).is_some()
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.nodes.get(first)?;
        for &index in rest {
            node = node.children()?.get(index)?;
        }
        Some(node)
    }

    /// Keys along the path from the top-level ancestor down to the node,
    /// inclusive.
    pub fn path_keys(&self, key: Key) -> Option<Vec<Key>> {
        let path = self.find_path(key)?;
        let mut keys = Vec::with_capacity(path.len());
        for end in 1..=path.len() {
            keys.push(self.node_at(&path[..end])?.key());
        }
        Some(keys)
    }

    /// Parent key and child index of a node. The parent of a top-level block
    /// is the document itself.
    pub fn parent_of(&self, key: Key) -> Option<(Key, usize)> {
        let path = self.find_path(key)?;
        let (&index, parent_path) = path.split_last()?;
        let parent_key = if parent_path.is_empty() {
            self.key
        } else {
            self.node_at(parent_path)?.key()
        };
        Some((parent_key, index))
    }

    /// Child list of the document or of a block/inline node.
    pub fn children_of(&self, key: Key) -> Option<&[Node]> {
        if key == self.key {
            return Some(&self.nodes);
        }
        let path = self.find_path(key)?;
        self.node_at(&path)?.children()
    }

    pub fn children_of_mut(&mut self, key: Key) -> Option<&mut Vec<Node>> {
        if key == self.key {
            return Some(&mut self.nodes);
        }
        fn rec(nodes: &mut Vec<Node>, key: Key) -> Option<&mut Vec<Node>> {
            if let Some(i) = nodes.iter().position(|n| n.key() == key) {
                return nodes[i].children_mut();
            }
            for node in nodes.iter_mut() {
                if let Some(children) = node.children_mut() {
                    if let Some(found) = rec(children, key) {
                        return Some(found);
                    }
                }
            }
            None
        }
        rec(&mut self.nodes, key)
    }

    pub fn get_text(&self, key: Key) -> Option<&Text> {
        let path = self.find_path(key)?;
        self.node_at(&path)?.as_text()
    }

    pub fn get_text_mut(&mut self, key: Key) -> Option<&mut Text> {
        fn rec(nodes: &mut [Node], key: Key) -> Option<&mut Text> {
            for node in nodes.iter_mut() {
                if let Node::Text(t) = node {
                    if t.key == key {
                        return Some(t);
                    }
                    continue;
                }
                if let Some(children) = node.children_mut() {
                    if let Some(t) = rec(children, key) {
                        return Some(t);
                    }
                }
            }
            None
        }
        rec(&mut self.nodes, key)
    }

    pub fn get_block(&self, key: Key) -> Option<&Block> {
        let path = self.find_path(key)?;
        self.node_at(&path)?.as_block()
    }

    /// Remove a node (and its subtree) from wherever it sits.
    pub fn remove_node(&mut self, key: Key) -> Option<Node> {
        fn rec(nodes: &mut Vec<Node>, key: Key) -> Option<Node> {
            if let Some(i) = nodes.iter().position(|n| n.key() == key) {
                return Some(nodes.remove(i));
            }
            for node in nodes.iter_mut() {
                if let Some(children) = node.children_mut() {
                    if let Some(removed) = rec(children, key) {
                        return Some(removed);
                    }
                }
            }
            None
        }
        rec(&mut self.nodes, key)
    }

    /// Nearest ancestor block of a node (the node itself when it is a block).
    pub fn closest_block(&self, key: Key) -> Option<&Block> {
        let path = self.find_path(key)?;
        for end in (1..=path.len()).rev() {
            if let Some(block) = self.node_at(&path[..end])?.as_block() {
                return Some(block);
            }
        }
        None
    }

    /// Top-level ancestor block of a node.
    pub fn top_block(&self, key: Key) -> Option<&Block> {
        let path = self.find_path(key)?;
        self.node_at(&path[..1])?.as_block()
    }

    /// Keys of all text nodes in document order.
    pub fn text_order(&self) -> Vec<Key> {
        fn rec(nodes: &[Node], out: &mut Vec<Key>) {
            for node in nodes {
                match node {
                    Node::Text(t) => out.push(t.key),
                    _ => {
                        if let Some(children) = node.children() {
                            rec(children, out);
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        rec(&self.nodes, &mut out);
        out
    }
}

/// Char count of a string.
pub(crate) fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Split a string at a char index, clamped to the string's char length.
pub(crate) fn split_at_char(s: &str, index: usize) -> (&str, &str) {
    let byte = s
        .char_indices()
        .nth(index)
        .map(|(b, _)| b)
        .unwrap_or(s.len());
    s.split_at(byte)
}

fn find_in(nodes: &[Node], key: Key, path: &mut Vec<usize>) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        if node.key() == key {
            return true;
        }
        if let Some(children) = node.children() {
            if find_in(children, key, path) {
                return true;
            }
        }
        path.pop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marks(types: &[MarkType]) -> BTreeSet<MarkType> {
        types.iter().copied().collect()
    }

    // ============ Equality and identity ============

    #[test]
    fn test_equality_ignores_keys() {
        let a = Block::paragraph("hello");
        let b = Block::paragraph("hello");
        assert_ne!(a.key, b.key);
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_sees_content() {
        assert_ne!(Block::paragraph("hello"), Block::paragraph("world"));
        assert_ne!(
            Block::leaf(BlockType::Quote, "x"),
            Block::leaf(BlockType::Code, "x")
        );
    }

    // ============ Block type string forms ============

    #[test]
    fn test_block_type_round_trips_through_strings() {
        let all = [
            BlockType::Paragraph,
            BlockType::HeadingThree,
            BlockType::ListItem,
            BlockType::BulletedList,
            BlockType::NumberedList,
            BlockType::Quote,
            BlockType::Code,
            BlockType::Table,
            BlockType::TableRow,
            BlockType::TableCell,
            BlockType::Image,
            BlockType::ThematicBreak,
            BlockType::Plugin("youtube".to_string()),
        ];
        for ty in all {
            let parsed: BlockType = ty.to_string().parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }

    #[test]
    fn test_plugin_type_string_form() {
        let ty = BlockType::Plugin("gallery".to_string());
        assert_eq!(ty.to_string(), "plugin_gallery");
        assert!(ty.is_void());
    }

    #[test]
    fn test_unknown_block_type_is_an_error() {
        assert!("marquee".parse::<BlockType>().is_err());
    }

    // ============ Text node editing ============

    #[test]
    fn test_text_insert_inherits_marks() {
        let mut text = Text::new(vec![
            Leaf::marked("bold", marks(&[MarkType::Bold])),
            Leaf::plain(" plain"),
        ]);
        text.insert(2, "XX", None);
        assert_eq!(text.as_string(), "boXXld plain");
        assert_eq!(text.ranges[0].marks, marks(&[MarkType::Bold]));
        assert_eq!(text.ranges[0].text, "boXXld");
    }

    #[test]
    fn test_text_insert_with_explicit_marks_splits_leaf() {
        let mut text = Text::plain("abcd");
        text.insert(2, "!", Some(marks(&[MarkType::Italic])));
        assert_eq!(text.as_string(), "ab!cd");
        assert_eq!(text.ranges.len(), 3);
        assert_eq!(text.ranges[1].marks, marks(&[MarkType::Italic]));
    }

    #[test]
    fn test_text_insert_into_empty() {
        let mut text = Text::empty();
        text.insert(0, "hi", None);
        assert_eq!(text.as_string(), "hi");
        assert_eq!(text.ranges.len(), 1);
    }

    #[test]
    fn test_text_delete_across_leaves() {
        let mut text = Text::new(vec![
            Leaf::plain("one "),
            Leaf::marked("two", marks(&[MarkType::Bold])),
            Leaf::plain(" three"),
        ]);
        text.delete(2, 9);
        assert_eq!(text.as_string(), "onthree");
    }

    #[test]
    fn test_text_delete_everything_keeps_one_empty_leaf() {
        let mut text = Text::plain("abc");
        text.delete(0, 3);
        assert_eq!(text.ranges.len(), 1);
        assert!(text.is_empty());
    }

    #[test]
    fn test_text_delete_handles_multibyte_chars() {
        let mut text = Text::plain("a世界b");
        text.delete(1, 3);
        assert_eq!(text.as_string(), "ab");
    }

    #[test]
    fn test_map_marks_splits_at_boundaries() {
        let mut text = Text::plain("abcdef");
        text.map_marks(2, 4, |m| {
            m.insert(MarkType::Bold);
        });
        assert_eq!(text.ranges.len(), 3);
        assert_eq!(text.ranges[1].text, "cd");
        assert!(text.ranges[1].marks.contains(&MarkType::Bold));
        assert!(text.ranges[0].marks.is_empty());
        assert!(text.ranges[2].marks.is_empty());
    }

    #[test]
    fn test_normalize_merges_equal_mark_runs() {
        let mut text = Text {
            key: Key::new(),
            ranges: vec![Leaf::plain("a"), Leaf::plain("b"), Leaf::plain("")],
        };
        text.normalize();
        assert_eq!(text.ranges.len(), 1);
        assert_eq!(text.ranges[0].text, "ab");
    }

    #[test]
    fn test_common_marks_intersection() {
        let text = Text::new(vec![
            Leaf::marked("ab", marks(&[MarkType::Bold, MarkType::Italic])),
            Leaf::marked("cd", marks(&[MarkType::Bold])),
        ]);
        assert_eq!(text.common_marks(0, 4), Some(marks(&[MarkType::Bold])));
        assert_eq!(
            text.common_marks(0, 2),
            Some(marks(&[MarkType::Bold, MarkType::Italic]))
        );
    }

    // ============ Tree queries ============

    fn sample_doc() -> Document {
        Document::new(vec![
            Block::paragraph("first"),
            Block::container(
                BlockType::BulletedList,
                vec![
                    Block::leaf(BlockType::ListItem, "alpha"),
                    Block::leaf(BlockType::ListItem, "beta"),
                ],
            ),
        ])
    }

    #[test]
    fn test_find_path_for_nested_node() {
        let doc = sample_doc();
        let list = doc.nodes[1].as_block().unwrap();
        let beta = list.nodes[1].as_block().unwrap();
        assert_eq!(doc.find_path(beta.key), Some(vec![1, 1]));
        assert_eq!(doc.find_path(doc.key), Some(vec![]));
        assert_eq!(doc.find_path(Key::new()), None);
    }

    #[test]
    fn test_parent_of_top_level_block_is_document() {
        let doc = sample_doc();
        let first = doc.nodes[0].key();
        assert_eq!(doc.parent_of(first), Some((doc.key, 0)));
    }

    #[test]
    fn test_closest_and_top_block_of_text() {
        let doc = sample_doc();
        let list = doc.nodes[1].as_block().unwrap();
        let alpha = list.nodes[0].as_block().unwrap();
        let text_key = alpha.first_text().unwrap().key;

        assert_eq!(doc.closest_block(text_key).unwrap().ty, BlockType::ListItem);
        assert_eq!(doc.top_block(text_key).unwrap().ty, BlockType::BulletedList);
    }

    #[test]
    fn test_text_order_is_document_order() {
        let doc = sample_doc();
        let order = doc.text_order();
        assert_eq!(order.len(), 3);
        let first_text = doc.get_text(order[0]).unwrap();
        assert_eq!(first_text.as_string(), "first");
        let last_text = doc.get_text(order[2]).unwrap();
        assert_eq!(last_text.as_string(), "beta");
    }

    #[test]
    fn test_remove_node_detaches_subtree() {
        let mut doc = sample_doc();
        let list_key = doc.nodes[1].key();
        let removed = doc.remove_node(list_key).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(removed.as_block().is_some());
        assert!(!doc.contains(list_key));
    }

    // ============ Raw tree serialization ============

    #[test]
    fn test_raw_round_trip_preserves_content() {
        let doc = Document::new(vec![
            Block::leaf(BlockType::HeadingTwo, "Title"),
            Block::new(
                BlockType::Paragraph,
                vec![Node::Text(Text::new(vec![
                    Leaf::plain("go "),
                    Leaf::marked("boldly", [MarkType::Bold].into_iter().collect()),
                ]))],
            ),
        ]);
        let raw = doc.to_raw().unwrap();
        let back = Document::from_raw(&raw).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_raw_form_is_kind_tagged() {
        let doc = Document::new(vec![Block::paragraph("x")]);
        let raw = doc.to_raw().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["kind"], "document");
        assert_eq!(value["nodes"][0]["kind"], "block");
        assert_eq!(value["nodes"][0]["type"], "paragraph");
        assert_eq!(value["nodes"][0]["nodes"][0]["kind"], "text");
    }

    #[test]
    fn test_raw_rejects_non_document_root() {
        let result = Document::from_raw(r#"{"kind":"block","nodes":[]}"#);
        assert!(result.is_err());
    }
}

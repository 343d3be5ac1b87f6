use std::collections::BTreeSet;

use log::trace;
use thiserror::Error;

use crate::editing::{Point, Selection, Snapshot};
use crate::models::document::char_count;
use crate::models::{Block, BlockType, Document, Fragment, Inline, Key, MarkType, Node, Text};

/// A transform given coordinates that do not exist in the snapshot it was
/// applied to. This is a caller bug, not a runtime condition: the dispatcher
/// only derives coordinates from the live snapshot.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("unknown node key: {0}")]
    UnknownKey(Key),
    #[error("node {0} is not a text node")]
    NotAText(Key),
    #[error("node {0} cannot hold children")]
    NotAParent(Key),
    #[error("offset {offset} out of range for text {key} (len {len})")]
    OffsetOutOfRange { key: Key, offset: usize, len: usize },
    #[error("index {index} out of range for parent {parent} (len {len})")]
    IndexOutOfRange {
        parent: Key,
        index: usize,
        len: usize,
    },
    #[error("no ancestor block of type {0} to unwrap")]
    BlockNotWrapped(BlockType),
}

/// One atomic edit. Applied through [`apply_op`], each op is pure: it reads
/// a snapshot and produces a new one, leaving the input untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    InsertText { at: Point, text: String },
    DeleteBackward { n: usize },
    DeleteForward { n: usize },
    SetBlock { ty: BlockType },
    WrapBlock { ty: BlockType },
    UnwrapBlock { ty: BlockType },
    ToggleMark { mark: MarkType },
    InsertBlock { block: Block },
    InsertFragment { fragment: Fragment },
    InsertNodeByKey { parent: Key, index: usize, node: Node },
    InsertLink { href: String, text: String },
    CollapseToStartOf { key: Key },
    CollapseToEndOf { key: Key },
    Focus,
}

/// Apply one op to a snapshot, producing the next snapshot.
pub fn apply_op(snapshot: &Snapshot, op: &Op) -> Result<Snapshot, StructuralError> {
    trace!("apply_op: {op:?}");
    match op {
        Op::InsertText { at, text } => insert_text(snapshot, *at, text),
        Op::DeleteBackward { n } => delete_backward(snapshot, *n),
        Op::DeleteForward { n } => delete_forward(snapshot, *n),
        Op::SetBlock { ty } => set_block(snapshot, ty),
        Op::WrapBlock { ty } => wrap_block(snapshot, ty),
        Op::UnwrapBlock { ty } => unwrap_block(snapshot, ty),
        Op::ToggleMark { mark } => toggle_mark(snapshot, *mark),
        Op::InsertBlock { block } => insert_block(snapshot, block),
        Op::InsertFragment { fragment } => insert_fragment(snapshot, fragment),
        Op::InsertNodeByKey { parent, index, node } => {
            insert_node_by_key(snapshot, *parent, *index, node)
        }
        Op::InsertLink { href, text } => insert_link(snapshot, href, text),
        Op::CollapseToStartOf { key } => collapse_to_start_of(snapshot, *key),
        Op::CollapseToEndOf { key } => collapse_to_end_of(snapshot, *key),
        Op::Focus => {
            let mut next = snapshot.clone();
            next.selection.is_focused = true;
            Ok(next)
        }
    }
}

// ---------------------------------------------------------------------------
// Point and range resolution

fn check_point(document: &Document, point: Point) -> Result<usize, StructuralError> {
    let text = document.get_text(point.key).ok_or_else(|| {
        if document.contains(point.key) {
            StructuralError::NotAText(point.key)
        } else {
            StructuralError::UnknownKey(point.key)
        }
    })?;
    let len = text.len();
    if point.offset > len {
        return Err(StructuralError::OffsetOutOfRange {
            key: point.key,
            offset: point.offset,
            len,
        });
    }
    Ok(len)
}

/// A selected char range within one text node.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    key: Key,
    start: usize,
    end: usize,
}

/// Resolve the selection to ordered per-text-node segments.
fn selection_segments(
    document: &Document,
    selection: &Selection,
) -> Result<Vec<Segment>, StructuralError> {
    check_point(document, selection.anchor)?;
    check_point(document, selection.focus)?;

    let order = document.text_order();
    let anchor_index = order
        .iter()
        .position(|&k| k == selection.anchor.key)
        .ok_or(StructuralError::UnknownKey(selection.anchor.key))?;
    let focus_index = order
        .iter()
        .position(|&k| k == selection.focus.key)
        .ok_or(StructuralError::UnknownKey(selection.focus.key))?;

    let (first, last) = if (anchor_index, selection.anchor.offset)
        <= (focus_index, selection.focus.offset)
    {
        (
            (anchor_index, selection.anchor.offset),
            (focus_index, selection.focus.offset),
        )
    } else {
        (
            (focus_index, selection.focus.offset),
            (anchor_index, selection.anchor.offset),
        )
    };

    if first.0 == last.0 {
        return Ok(vec![Segment {
            key: order[first.0],
            start: first.1,
            end: last.1,
        }]);
    }

    let mut segments = Vec::with_capacity(last.0 - first.0 + 1);
    for index in first.0..=last.0 {
        let key = order[index];
        let len = document
            .get_text(key)
            .map(Text::len)
            .ok_or(StructuralError::UnknownKey(key))?;
        let (start, end) = if index == first.0 {
            (first.1, len)
        } else if index == last.0 {
            (0, last.1)
        } else {
            (0, len)
        };
        segments.push(Segment { key, start, end });
    }
    Ok(segments)
}

/// Leaf blocks touched by the selection, in document order.
fn touched_blocks(
    document: &Document,
    selection: &Selection,
) -> Result<Vec<Key>, StructuralError> {
    let segments = selection_segments(document, selection)?;
    let mut keys = Vec::new();
    for segment in segments {
        let block = document
            .closest_block(segment.key)
            .ok_or(StructuralError::UnknownKey(segment.key))?;
        if !keys.contains(&block.key) {
            keys.push(block.key);
        }
    }
    Ok(keys)
}

fn block_mut(nodes: &mut [Node], key: Key) -> Option<&mut Block> {
    for node in nodes.iter_mut() {
        match node {
            Node::Block(b) => {
                if b.key == key {
                    return Some(b);
                }
                if let Some(found) = block_mut(&mut b.nodes, key) {
                    return Some(found);
                }
            }
            Node::Inline(i) => {
                if let Some(found) = block_mut(&mut i.nodes, key) {
                    return Some(found);
                }
            }
            Node::Text(_) => {}
        }
    }
    None
}

fn last_text_in(nodes: &[Node]) -> Option<&Text> {
    for node in nodes.iter().rev() {
        match node {
            Node::Text(t) => return Some(t),
            Node::Block(b) => {
                if let Some(t) = last_text_in(&b.nodes) {
                    return Some(t);
                }
            }
            Node::Inline(i) => {
                if let Some(t) = last_text_in(&i.nodes) {
                    return Some(t);
                }
            }
        }
    }
    None
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

/// Point at the start of a node's first descendant text.
fn start_point_of(document: &Document, key: Key) -> Option<Point> {
    if key == document.key {
        return first_text_in(&document.nodes).map(|t| Point::new(t.key, 0));
    }
    let path = document.find_path(key)?;
    match document.node_at(&path)? {
        Node::Text(t) => Some(Point::new(t.key, 0)),
        Node::Block(b) => b.first_text().map(|t| Point::new(t.key, 0)),
        Node::Inline(i) => first_text_in(&i.nodes).map(|t| Point::new(t.key, 0)),
    }
}

fn end_point_of_block(block: &Block) -> Option<Point> {
    last_text_in(&block.nodes).map(|t| Point::new(t.key, t.len()))
}

// ---------------------------------------------------------------------------
// Text edits

fn insert_text(snapshot: &Snapshot, at: Point, text: &str) -> Result<Snapshot, StructuralError> {
    check_point(&snapshot.document, at)?;
    let mut next = snapshot.clone();
    let marks = next.marks.clone();
    let node = next
        .document
        .get_text_mut(at.key)
        .ok_or(StructuralError::NotAText(at.key))?;
    node.insert(at.offset, text, marks);
    let cursor = Point::new(at.key, at.offset + char_count(text));
    next.selection = next.selection.collapse_to(cursor);
    Ok(next)
}

fn delete_backward(snapshot: &Snapshot, n: usize) -> Result<Snapshot, StructuralError> {
    let mut next = snapshot.clone();
    if !next.selection.is_collapsed() {
        return delete_selection(&next);
    }
    for _ in 0..n {
        next = delete_one_backward(&next)?;
    }
    Ok(next)
}

fn delete_forward(snapshot: &Snapshot, n: usize) -> Result<Snapshot, StructuralError> {
    let mut next = snapshot.clone();
    if !next.selection.is_collapsed() {
        return delete_selection(&next);
    }
    for _ in 0..n {
        next = delete_one_forward(&next)?;
    }
    Ok(next)
}

/// Delete an expanded selection's text content and collapse to its start.
fn delete_selection(snapshot: &Snapshot) -> Result<Snapshot, StructuralError> {
    let segments = selection_segments(&snapshot.document, &snapshot.selection)?;
    let mut next = snapshot.clone();
    let start = Point::new(segments[0].key, segments[0].start);
    for segment in segments {
        if let Some(text) = next.document.get_text_mut(segment.key) {
            text.delete(segment.start, segment.end);
        }
    }
    next.selection = next.selection.collapse_to(start);
    next.marks = None;
    Ok(next)
}

fn delete_one_backward(snapshot: &Snapshot) -> Result<Snapshot, StructuralError> {
    let focus = snapshot.selection.focus;
    check_point(&snapshot.document, focus)?;
    let mut next = snapshot.clone();

    if focus.offset > 0 {
        let text = next
            .document
            .get_text_mut(focus.key)
            .ok_or(StructuralError::NotAText(focus.key))?;
        text.delete(focus.offset - 1, focus.offset);
        next.selection = next
            .selection
            .collapse_to(Point::new(focus.key, focus.offset - 1));
        return Ok(next);
    }

    // At offset 0: either step into the previous text node of the same
    // block, or merge this block into the previous one.
    let order = next.document.text_order();
    let index = order
        .iter()
        .position(|&k| k == focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;
    let Some(&prev_key) = index.checked_sub(1).and_then(|i| order.get(i)) else {
        return Ok(next); // start of document
    };

    let focus_block_key = next
        .document
        .closest_block(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?
        .key;
    let prev_block = next
        .document
        .closest_block(prev_key)
        .ok_or(StructuralError::UnknownKey(prev_key))?;
    let prev_block_key = prev_block.key;

    if prev_block_key == focus_block_key {
        // Same block (e.g. across a link boundary): delete at the end of the
        // previous text node.
        let prev_len = next
            .document
            .get_text(prev_key)
            .map(Text::len)
            .ok_or(StructuralError::UnknownKey(prev_key))?;
        let point = Point::new(prev_key, prev_len);
        next.selection = next.selection.collapse_to(point);
        if prev_len == 0 {
            return Ok(next);
        }
        return delete_one_backward(&next);
    }

    if prev_block.is_void() {
        // Backspacing into a void block removes it
        remove_block_and_prune(&mut next.document, prev_block_key);
        return Ok(next);
    }

    // Merge the focus block into the previous block
    let junction = next
        .document
        .get_block(prev_block_key)
        .and_then(end_point_of_block)
        .unwrap_or(Point::new(prev_key, 0));
    let Some(Node::Block(removed)) = next.document.remove_node(focus_block_key) else {
        return Err(StructuralError::UnknownKey(focus_block_key));
    };
    prune_empty_containers(&mut next.document);
    if let Some(target) = block_mut(&mut next.document.nodes, prev_block_key) {
        target.nodes.extend(removed.nodes);
    }
    next.selection = next.selection.collapse_to(junction);
    Ok(next)
}

fn delete_one_forward(snapshot: &Snapshot) -> Result<Snapshot, StructuralError> {
    let focus = snapshot.selection.focus;
    let len = check_point(&snapshot.document, focus)?;
    let mut next = snapshot.clone();

    if focus.offset < len {
        let text = next
            .document
            .get_text_mut(focus.key)
            .ok_or(StructuralError::NotAText(focus.key))?;
        text.delete(focus.offset, focus.offset + 1);
        return Ok(next);
    }

    let order = next.document.text_order();
    let index = order
        .iter()
        .position(|&k| k == focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;
    let Some(&next_key) = order.get(index + 1) else {
        return Ok(next); // end of document
    };

    let focus_block_key = next
        .document
        .closest_block(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?
        .key;
    let next_block = next
        .document
        .closest_block(next_key)
        .ok_or(StructuralError::UnknownKey(next_key))?;
    let next_block_key = next_block.key;

    if next_block_key == focus_block_key {
        let point = Point::new(next_key, 0);
        next.selection = next.selection.collapse_to(point);
        return delete_one_forward(&next);
    }

    if next_block.is_void() {
        remove_block_and_prune(&mut next.document, next_block_key);
        next.selection = next.selection.collapse_to(focus);
        return Ok(next);
    }

    // Merge the next block into the focus block
    let Some(Node::Block(removed)) = next.document.remove_node(next_block_key) else {
        return Err(StructuralError::UnknownKey(next_block_key));
    };
    prune_empty_containers(&mut next.document);
    if let Some(target) = block_mut(&mut next.document.nodes, focus_block_key) {
        target.nodes.extend(removed.nodes);
    }
    next.selection = next.selection.collapse_to(focus);
    Ok(next)
}

fn remove_block_and_prune(document: &mut Document, key: Key) {
    document.remove_node(key);
    prune_empty_containers(document);
}

/// Drop container blocks left with no children after a structural removal.
fn prune_empty_containers(document: &mut Document) {
    fn prune(nodes: &mut Vec<Node>) {
        for node in nodes.iter_mut() {
            if let Some(children) = node.children_mut() {
                prune(children);
            }
        }
        nodes.retain(|node| match node {
            Node::Block(b) => !(b.ty.is_container() && b.nodes.is_empty()),
            _ => true,
        });
    }
    prune(&mut document.nodes);
}

// ---------------------------------------------------------------------------
// Block edits

fn set_block(snapshot: &Snapshot, ty: &BlockType) -> Result<Snapshot, StructuralError> {
    let keys = touched_blocks(&snapshot.document, &snapshot.selection)?;
    let mut next = snapshot.clone();
    for key in keys {
        if let Some(block) = block_mut(&mut next.document.nodes, key) {
            block.ty = ty.clone();
        }
    }
    Ok(next)
}

fn wrap_block(snapshot: &Snapshot, ty: &BlockType) -> Result<Snapshot, StructuralError> {
    let keys = touched_blocks(&snapshot.document, &snapshot.selection)?;
    let mut next = snapshot.clone();

    // Wrap at the touched blocks' common parent when they share one,
    // otherwise at the top level spanning their ancestors.
    let mut parents = Vec::new();
    for &key in &keys {
        let (parent, index) = next
            .document
            .parent_of(key)
            .ok_or(StructuralError::UnknownKey(key))?;
        parents.push((parent, index));
    }
    let same_parent = parents.windows(2).all(|w| w[0].0 == w[1].0);

    let (parent_key, first, last) = if same_parent {
        let indices: Vec<usize> = parents.iter().map(|&(_, i)| i).collect();
        let first = *indices.iter().min().unwrap_or(&0);
        let last = *indices.iter().max().unwrap_or(&0);
        (parents[0].0, first, last)
    } else {
        let doc_key = next.document.key;
        let mut tops = Vec::new();
        for &key in &keys {
            let top = next
                .document
                .top_block(key)
                .ok_or(StructuralError::UnknownKey(key))?;
            let (_, index) = next
                .document
                .parent_of(top.key)
                .ok_or(StructuralError::UnknownKey(top.key))?;
            tops.push(index);
        }
        let first = *tops.iter().min().unwrap_or(&0);
        let last = *tops.iter().max().unwrap_or(&0);
        (doc_key, first, last)
    };

    let children = next
        .document
        .children_of_mut(parent_key)
        .ok_or(StructuralError::NotAParent(parent_key))?;
    let wrapped: Vec<Node> = children.drain(first..=last).collect();
    let container = Block::new(
        ty.clone(),
        wrapped,
    );
    children.insert(first, Node::Block(container));
    Ok(next)
}

fn unwrap_block(snapshot: &Snapshot, ty: &BlockType) -> Result<Snapshot, StructuralError> {
    let focus = snapshot.selection.focus;
    let keys = snapshot
        .document
        .path_keys(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;

    // Nearest ancestor of the requested type, searching upward
    let mut target = None;
    for key in keys.iter().rev() {
        if let Some(block) = snapshot.document.get_block(*key) {
            if block.ty == *ty {
                target = Some(*key);
                break;
            }
        }
    }
    let target = target.ok_or_else(|| StructuralError::BlockNotWrapped(ty.clone()))?;

    let mut next = snapshot.clone();
    let (parent_key, index) = next
        .document
        .parent_of(target)
        .ok_or(StructuralError::UnknownKey(target))?;
    let Some(Node::Block(removed)) = next.document.remove_node(target) else {
        return Err(StructuralError::UnknownKey(target));
    };
    let children = next
        .document
        .children_of_mut(parent_key)
        .ok_or(StructuralError::NotAParent(parent_key))?;
    for (offset, node) in removed.nodes.into_iter().enumerate() {
        children.insert(index + offset, node);
    }
    Ok(next)
}

fn toggle_mark(snapshot: &Snapshot, mark: MarkType) -> Result<Snapshot, StructuralError> {
    let mut next = snapshot.clone();

    if next.selection.is_collapsed() {
        // Queue the mark for the next insert
        let focus = next.selection.focus;
        check_point(&next.document, focus)?;
        let mut marks = match next.marks.take() {
            Some(marks) => marks,
            None => next
                .document
                .get_text(focus.key)
                .map(|t| t.marks_at(focus.offset))
                .unwrap_or_default(),
        };
        if !marks.remove(&mark) {
            marks.insert(mark);
        }
        next.marks = Some(marks);
        return Ok(next);
    }

    let segments = selection_segments(&next.document, &next.selection)?;

    // Toggle semantics: add when any selected char lacks the mark, remove
    // only when all of them carry it.
    let mut all_have = true;
    let mut any_text = false;
    for segment in &segments {
        let text = next
            .document
            .get_text(segment.key)
            .ok_or(StructuralError::UnknownKey(segment.key))?;
        if let Some(common) = text.common_marks(segment.start, segment.end) {
            any_text = true;
            if !common.contains(&mark) {
                all_have = false;
            }
        }
    }
    if !any_text {
        return Ok(next);
    }

    for segment in &segments {
        if let Some(text) = next.document.get_text_mut(segment.key) {
            text.map_marks(segment.start, segment.end, |marks| {
                if all_have {
                    marks.remove(&mark);
                } else {
                    marks.insert(mark);
                }
            });
        }
    }
    Ok(next)
}

fn insert_block(snapshot: &Snapshot, block: &Block) -> Result<Snapshot, StructuralError> {
    let focus = snapshot.selection.focus;
    check_point(&snapshot.document, focus)?;
    let mut next = snapshot.clone();

    let top = next
        .document
        .top_block(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;
    let top_key = top.key;
    let replace = top.ty == BlockType::Paragraph && top.text().is_empty();
    let (_, index) = next
        .document
        .parent_of(top_key)
        .ok_or(StructuralError::UnknownKey(top_key))?;

    let inserted = block.clone();
    let cursor = inserted.first_text().map(|t| Point::new(t.key, 0));
    if replace {
        next.document.remove_node(top_key);
        next.document.nodes.insert(index, Node::Block(inserted));
    } else {
        next.document
            .nodes
            .insert(index + 1, Node::Block(inserted));
    }
    if let Some(cursor) = cursor {
        next.selection = next.selection.collapse_to(cursor);
    }
    next.marks = None;
    Ok(next)
}

fn insert_fragment(snapshot: &Snapshot, fragment: &Fragment) -> Result<Snapshot, StructuralError> {
    if fragment.is_empty() {
        return Ok(snapshot.clone());
    }
    let focus = snapshot.selection.focus;
    check_point(&snapshot.document, focus)?;
    let mut next = snapshot.clone();

    let mut blocks: Vec<Block> = fragment.nodes.clone();
    let first = blocks.remove(0);
    let mergeable = !first.is_void()
        && !first.ty.is_container()
        && first.nodes.iter().all(|n| !matches!(n, Node::Block(_)));

    let mut cursor = None;
    if mergeable {
        // Splice the first block's inline content into the focus text
        let focus_block_key = next
            .document
            .closest_block(focus.key)
            .ok_or(StructuralError::UnknownKey(focus.key))?
            .key;
        let text = next
            .document
            .get_text(focus.key)
            .ok_or(StructuralError::UnknownKey(focus.key))?;
        let mut right = Text {
            key: Key::new(),
            ranges: text.ranges.clone(),
        };
        right.delete(0, focus.offset);
        let right_key = right.key;

        let parent = next
            .document
            .children_of_mut(focus_block_key)
            .ok_or(StructuralError::NotAParent(focus_block_key))?;
        let position = parent
            .iter()
            .position(|n| n.key() == focus.key)
            .ok_or(StructuralError::UnknownKey(focus.key))?;
        let mut spliced: Vec<Node> = vec![];
        spliced.extend(first.nodes);
        spliced.push(Node::Text(right));
        for (offset, node) in spliced.into_iter().enumerate() {
            parent.insert(position + 1 + offset, node);
        }
        if let Some(text) = next.document.get_text_mut(focus.key) {
            text.delete(focus.offset, text.len());
        }
        cursor = Some(Point::new(right_key, 0));
    } else {
        blocks.insert(0, first);
    }

    if !blocks.is_empty() {
        let top_key = next
            .document
            .top_block(focus.key)
            .ok_or(StructuralError::UnknownKey(focus.key))?
            .key;
        let (_, index) = next
            .document
            .parent_of(top_key)
            .ok_or(StructuralError::UnknownKey(top_key))?;
        let last_end = blocks
            .last()
            .and_then(|b| last_text_in(&b.nodes))
            .map(|t| Point::new(t.key, t.len()));
        for (offset, block) in blocks.into_iter().enumerate() {
            next.document
                .nodes
                .insert(index + 1 + offset, Node::Block(block));
        }
        if let Some(point) = last_end {
            cursor = Some(point);
        }
    }

    if let Some(cursor) = cursor {
        next.selection = next.selection.collapse_to(cursor);
    }
    next.marks = None;
    Ok(next)
}

fn insert_node_by_key(
    snapshot: &Snapshot,
    parent: Key,
    index: usize,
    node: &Node,
) -> Result<Snapshot, StructuralError> {
    let mut next = snapshot.clone();
    if parent != next.document.key && !next.document.contains(parent) {
        return Err(StructuralError::UnknownKey(parent));
    }
    let children = next
        .document
        .children_of_mut(parent)
        .ok_or(StructuralError::NotAParent(parent))?;
    if index > children.len() {
        return Err(StructuralError::IndexOutOfRange {
            parent,
            index,
            len: children.len(),
        });
    }
    children.insert(index, node.clone());
    Ok(next)
}

fn insert_link(snapshot: &Snapshot, href: &str, text: &str) -> Result<Snapshot, StructuralError> {
    let focus = snapshot.selection.focus;
    check_point(&snapshot.document, focus)?;
    let mut next = snapshot.clone();

    let focus_block_key = next
        .document
        .closest_block(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?
        .key;
    let current = next
        .document
        .get_text(focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;
    let mut right = Text {
        key: Key::new(),
        ranges: current.ranges.clone(),
    };
    right.delete(0, focus.offset);
    let right_key = right.key;

    let parent = next
        .document
        .children_of_mut(focus_block_key)
        .ok_or(StructuralError::NotAParent(focus_block_key))?;
    let position = parent
        .iter()
        .position(|n| n.key() == focus.key)
        .ok_or(StructuralError::UnknownKey(focus.key))?;
    parent.insert(position + 1, Node::Text(right));
    parent.insert(position + 1, Node::Inline(Inline::link(href, text)));
    if let Some(left) = next.document.get_text_mut(focus.key) {
        left.delete(focus.offset, left.len());
    }
    next.selection = next.selection.collapse_to(Point::new(right_key, 0));
    Ok(next)
}

fn collapse_to_start_of(snapshot: &Snapshot, key: Key) -> Result<Snapshot, StructuralError> {
    let point =
        start_point_of(&snapshot.document, key).ok_or(StructuralError::UnknownKey(key))?;
    let mut next = snapshot.clone();
    next.selection = next.selection.collapse_to(point);
    next.marks = None;
    Ok(next)
}

fn collapse_to_end_of(snapshot: &Snapshot, key: Key) -> Result<Snapshot, StructuralError> {
    let point = end_point_of(&snapshot.document, key).ok_or(StructuralError::UnknownKey(key))?;
    let mut next = snapshot.clone();
    next.selection = next.selection.collapse_to(point);
    next.marks = None;
    Ok(next)
}

/// Point at the end of a node's last descendant text.
fn end_point_of(document: &Document, key: Key) -> Option<Point> {
    if key == document.key {
        return last_text_in(&document.nodes).map(|t| Point::new(t.key, t.len()));
    }
    let path = document.find_path(key)?;
    match document.node_at(&path)? {
        Node::Text(t) => Some(Point::new(t.key, t.len())),
        Node::Block(b) => last_text_in(&b.nodes).map(|t| Point::new(t.key, t.len())),
        Node::Inline(i) => last_text_in(&i.nodes).map(|t| Point::new(t.key, t.len())),
    }
}

/// Expanded-selection common marks across all selected text, used by the
/// keymap to report active marks.
pub fn selection_marks(snapshot: &Snapshot) -> Result<BTreeSet<MarkType>, StructuralError> {
    if snapshot.selection.is_collapsed() {
        if let Some(marks) = &snapshot.marks {
            return Ok(marks.clone());
        }
        let focus = snapshot.selection.focus;
        check_point(&snapshot.document, focus)?;
        return Ok(snapshot
            .document
            .get_text(focus.key)
            .map(|t| t.marks_at(focus.offset))
            .unwrap_or_default());
    }
    let segments = selection_segments(&snapshot.document, &snapshot.selection)?;
    let mut common: Option<BTreeSet<MarkType>> = None;
    for segment in segments {
        let text = snapshot
            .document
            .get_text(segment.key)
            .ok_or(StructuralError::UnknownKey(segment.key))?;
        if let Some(marks) = text.common_marks(segment.start, segment.end) {
            common = Some(match common {
                None => marks,
                Some(prev) => prev.intersection(&marks).copied().collect(),
            });
        }
    }
    Ok(common.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Data, Leaf};
    use pretty_assertions::assert_eq;

    fn snapshot_of(blocks: Vec<Block>) -> Snapshot {
        Snapshot::new(Document::new(blocks))
    }

    fn cursor_at(snapshot: &Snapshot, text_index: usize, offset: usize) -> Snapshot {
        let key = snapshot.document.text_order()[text_index];
        let mut next = snapshot.clone();
        next.selection = Selection::collapsed(Point::new(key, offset));
        next
    }

    fn select(snapshot: &Snapshot, from: (usize, usize), to: (usize, usize)) -> Snapshot {
        let order = snapshot.document.text_order();
        let mut next = snapshot.clone();
        next.selection = Selection::new(
            Point::new(order[from.0], from.1),
            Point::new(order[to.0], to.1),
        );
        next
    }

    fn doc_text(snapshot: &Snapshot) -> Vec<String> {
        snapshot.document.blocks().map(Block::text).collect()
    }

    // ============ InsertText ============

    #[test]
    fn test_insert_text_moves_cursor() {
        let base = snapshot_of(vec![Block::paragraph("helo")]);
        let at = Point::new(base.document.text_order()[0], 2);
        let next = apply_op(
            &base,
            &Op::InsertText {
                at,
                text: "l".into(),
            },
        )
        .unwrap();
        assert_eq!(doc_text(&next), vec!["hello"]);
        assert_eq!(next.selection.focus.offset, 3);
        // The input snapshot is untouched
        assert_eq!(doc_text(&base), vec!["helo"]);
    }

    #[test]
    fn test_insert_text_applies_pending_marks() {
        let mut base = cursor_at(&snapshot_of(vec![Block::paragraph("ab")]), 0, 1);
        base.marks = Some([MarkType::Bold].into_iter().collect());
        let at = base.selection.focus;
        let next = apply_op(
            &base,
            &Op::InsertText {
                at,
                text: "X".into(),
            },
        )
        .unwrap();
        let text = next.document.get_text(at.key).unwrap();
        assert_eq!(text.as_string(), "aXb");
        assert_eq!(text.ranges[1].text, "X");
        assert!(text.ranges[1].marks.contains(&MarkType::Bold));
    }

    #[test]
    fn test_insert_text_out_of_range_fails() {
        let base = snapshot_of(vec![Block::paragraph("ab")]);
        let at = Point::new(base.document.text_order()[0], 5);
        let result = apply_op(
            &base,
            &Op::InsertText {
                at,
                text: "x".into(),
            },
        );
        assert!(matches!(
            result,
            Err(StructuralError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_insert_text_unknown_key_fails() {
        let base = snapshot_of(vec![Block::paragraph("ab")]);
        let result = apply_op(
            &base,
            &Op::InsertText {
                at: Point::new(Key::new(), 0),
                text: "x".into(),
            },
        );
        assert!(matches!(result, Err(StructuralError::UnknownKey(_))));
    }

    // ============ Deletes ============

    #[test]
    fn test_delete_backward_within_text() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("abc")]), 0, 2);
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["ac"]);
        assert_eq!(next.selection.focus.offset, 1);
    }

    #[test]
    fn test_delete_backward_at_start_merges_blocks() {
        let base = cursor_at(
            &snapshot_of(vec![Block::paragraph("one"), Block::paragraph("two")]),
            1,
            0,
        );
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["onetwo"]);
        // Cursor sits at the junction
        assert_eq!(next.selection.focus.offset, 3);
    }

    #[test]
    fn test_delete_backward_at_document_start_is_noop() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("abc")]), 0, 0);
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["abc"]);
    }

    #[test]
    fn test_delete_backward_removes_preceding_void_block() {
        let base = cursor_at(
            &snapshot_of(vec![
                Block::void(BlockType::ThematicBreak, Data::new()),
                Block::paragraph("after"),
            ]),
            1,
            0,
        );
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(next.document.nodes.len(), 1);
        assert_eq!(doc_text(&next), vec!["after"]);
    }

    #[test]
    fn test_delete_forward_merges_next_block() {
        let base = cursor_at(
            &snapshot_of(vec![Block::paragraph("one"), Block::paragraph("two")]),
            0,
            3,
        );
        let next = apply_op(&base, &Op::DeleteForward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["onetwo"]);
    }

    #[test]
    fn test_expanded_selection_delete_collapses_to_start() {
        let base = select(&snapshot_of(vec![Block::paragraph("abcdef")]), (0, 1), (0, 4));
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["aef"]);
        assert_eq!(next.selection.focus.offset, 1);
        assert!(next.selection.is_collapsed());
    }

    #[test]
    fn test_backspace_merge_prunes_emptied_list() {
        let base = cursor_at(
            &snapshot_of(vec![
                Block::paragraph("para"),
                Block::container(
                    BlockType::BulletedList,
                    vec![Block::leaf(BlockType::ListItem, "item")],
                ),
            ]),
            1,
            0,
        );
        let next = apply_op(&base, &Op::DeleteBackward { n: 1 }).unwrap();
        assert_eq!(doc_text(&next), vec!["paraitem"]);
        assert_eq!(next.document.nodes.len(), 1);
    }

    // ============ SetBlock / WrapBlock / UnwrapBlock ============

    #[test]
    fn test_set_block_retypes_focus_block() {
        let base = snapshot_of(vec![Block::paragraph("text")]);
        let next = apply_op(
            &base,
            &Op::SetBlock {
                ty: BlockType::HeadingOne,
            },
        )
        .unwrap();
        assert_eq!(
            next.document.blocks().next().unwrap().ty,
            BlockType::HeadingOne
        );
    }

    #[test]
    fn test_set_block_covers_every_selected_block() {
        let base = select(
            &snapshot_of(vec![Block::paragraph("one"), Block::paragraph("two")]),
            (0, 1),
            (1, 1),
        );
        let next = apply_op(
            &base,
            &Op::SetBlock {
                ty: BlockType::Quote,
            },
        )
        .unwrap();
        let types: Vec<BlockType> = next.document.blocks().map(|b| b.ty.clone()).collect();
        assert_eq!(types, vec![BlockType::Quote, BlockType::Quote]);
    }

    #[test]
    fn test_wrap_block_wraps_selected_siblings() {
        let base = select(
            &snapshot_of(vec![
                Block::leaf(BlockType::ListItem, "one"),
                Block::leaf(BlockType::ListItem, "two"),
            ]),
            (0, 0),
            (1, 3),
        );
        let next = apply_op(
            &base,
            &Op::WrapBlock {
                ty: BlockType::BulletedList,
            },
        )
        .unwrap();
        assert_eq!(next.document.nodes.len(), 1);
        let list = next.document.blocks().next().unwrap();
        assert_eq!(list.ty, BlockType::BulletedList);
        assert_eq!(list.nodes.len(), 2);
    }

    #[test]
    fn test_unwrap_block_splices_children() {
        let base = snapshot_of(vec![Block::container(
            BlockType::Quote,
            vec![Block::paragraph("inner")],
        )]);
        let next = apply_op(
            &base,
            &Op::UnwrapBlock {
                ty: BlockType::Quote,
            },
        )
        .unwrap();
        assert_eq!(next.document.nodes.len(), 1);
        assert_eq!(
            next.document.blocks().next().unwrap().ty,
            BlockType::Paragraph
        );
    }

    #[test]
    fn test_unwrap_absent_type_is_structural_error() {
        let base = snapshot_of(vec![Block::paragraph("text")]);
        let result = apply_op(
            &base,
            &Op::UnwrapBlock {
                ty: BlockType::Quote,
            },
        );
        assert!(matches!(result, Err(StructuralError::BlockNotWrapped(_))));
    }

    // ============ ToggleMark ============

    #[test]
    fn test_toggle_mark_adds_when_any_char_lacks_it() {
        let base = select(
            &snapshot_of(vec![Block::new(
                BlockType::Paragraph,
                vec![Node::Text(Text::new(vec![
                    Leaf::marked("bo", [MarkType::Bold].into_iter().collect()),
                    Leaf::plain("ld"),
                ]))],
            )]),
            (0, 0),
            (0, 4),
        );
        let next = apply_op(
            &base,
            &Op::ToggleMark {
                mark: MarkType::Bold,
            },
        )
        .unwrap();
        let text = next.document.blocks().next().unwrap().first_text().unwrap();
        assert_eq!(text.ranges.len(), 1);
        assert!(text.ranges[0].marks.contains(&MarkType::Bold));
    }

    #[test]
    fn test_toggle_mark_removes_only_inside_selection() {
        // Selection fully inside bold text: mark removed from the selected
        // range only, surrounding bold text unaffected
        let base = select(
            &snapshot_of(vec![Block::new(
                BlockType::Paragraph,
                vec![Node::Text(Text::new(vec![Leaf::marked(
                    "bolded",
                    [MarkType::Bold].into_iter().collect(),
                )]))],
            )]),
            (0, 2),
            (0, 4),
        );
        let next = apply_op(
            &base,
            &Op::ToggleMark {
                mark: MarkType::Bold,
            },
        )
        .unwrap();
        let text = next.document.blocks().next().unwrap().first_text().unwrap();
        assert_eq!(text.ranges.len(), 3);
        assert!(text.ranges[0].marks.contains(&MarkType::Bold));
        assert!(text.ranges[1].marks.is_empty());
        assert_eq!(text.ranges[1].text, "ld");
        assert!(text.ranges[2].marks.contains(&MarkType::Bold));
    }

    #[test]
    fn test_toggle_mark_twice_restores_state() {
        let base = select(&snapshot_of(vec![Block::paragraph("plain")]), (0, 1), (0, 4));
        let once = apply_op(
            &base,
            &Op::ToggleMark {
                mark: MarkType::Italic,
            },
        )
        .unwrap();
        let twice = apply_op(
            &once,
            &Op::ToggleMark {
                mark: MarkType::Italic,
            },
        )
        .unwrap();
        assert_eq!(twice.document, base.document);
    }

    #[test]
    fn test_toggle_mark_collapsed_queues_pending_marks() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("ab")]), 0, 1);
        let next = apply_op(
            &base,
            &Op::ToggleMark {
                mark: MarkType::Bold,
            },
        )
        .unwrap();
        assert_eq!(next.document, base.document);
        assert!(next.marks.as_ref().unwrap().contains(&MarkType::Bold));
        let again = apply_op(
            &next,
            &Op::ToggleMark {
                mark: MarkType::Bold,
            },
        )
        .unwrap();
        assert!(!again.marks.as_ref().unwrap().contains(&MarkType::Bold));
    }

    // ============ Structural inserts ============

    #[test]
    fn test_insert_block_after_non_empty_focus() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("text")]), 0, 2);
        let block = Block::void(BlockType::ThematicBreak, Data::new());
        let next = apply_op(&base, &Op::InsertBlock { block }).unwrap();
        let types: Vec<BlockType> = next.document.blocks().map(|b| b.ty.clone()).collect();
        assert_eq!(types, vec![BlockType::Paragraph, BlockType::ThematicBreak]);
    }

    #[test]
    fn test_insert_block_replaces_empty_paragraph() {
        let base = snapshot_of(vec![Block::paragraph("")]);
        let block = Block::void(BlockType::Image, Data::new());
        let next = apply_op(&base, &Op::InsertBlock { block }).unwrap();
        let types: Vec<BlockType> = next.document.blocks().map(|b| b.ty.clone()).collect();
        assert_eq!(types, vec![BlockType::Image]);
    }

    #[test]
    fn test_insert_node_by_key_at_document_level() {
        let base = snapshot_of(vec![Block::paragraph("only")]);
        let doc_key = base.document.key;
        let node = Node::Block(Block::paragraph("new"));
        let next = apply_op(
            &base,
            &Op::InsertNodeByKey {
                parent: doc_key,
                index: 0,
                node,
            },
        )
        .unwrap();
        assert_eq!(doc_text(&next), vec!["new", "only"]);
    }

    #[test]
    fn test_insert_node_by_key_index_out_of_range() {
        let base = snapshot_of(vec![Block::paragraph("only")]);
        let doc_key = base.document.key;
        let result = apply_op(
            &base,
            &Op::InsertNodeByKey {
                parent: doc_key,
                index: 5,
                node: Node::Block(Block::paragraph("x")),
            },
        );
        assert!(matches!(
            result,
            Err(StructuralError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_insert_node_by_key_unknown_parent() {
        let base = snapshot_of(vec![Block::paragraph("only")]);
        let result = apply_op(
            &base,
            &Op::InsertNodeByKey {
                parent: Key::new(),
                index: 0,
                node: Node::Block(Block::paragraph("x")),
            },
        );
        assert!(matches!(result, Err(StructuralError::UnknownKey(_))));
    }

    #[test]
    fn test_insert_fragment_merges_first_block_inline() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("ab")]), 0, 1);
        let fragment = Fragment::new(vec![Block::paragraph("XY")]);
        let next = apply_op(&base, &Op::InsertFragment { fragment }).unwrap();
        assert_eq!(doc_text(&next), vec!["aXYb"]);
    }

    #[test]
    fn test_insert_fragment_appends_following_blocks() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("ab")]), 0, 2);
        let fragment = Fragment::new(vec![
            Block::paragraph("tail"),
            Block::leaf(BlockType::Quote, "quoted"),
        ]);
        let next = apply_op(&base, &Op::InsertFragment { fragment }).unwrap();
        assert_eq!(doc_text(&next), vec!["abtail", "quoted"]);
        let types: Vec<BlockType> = next.document.blocks().map(|b| b.ty.clone()).collect();
        assert_eq!(types, vec![BlockType::Paragraph, BlockType::Quote]);
    }

    #[test]
    fn test_insert_link_splits_text() {
        let base = cursor_at(&snapshot_of(vec![Block::paragraph("see here")]), 0, 4);
        let next = apply_op(
            &base,
            &Op::InsertLink {
                href: "https://example.com".into(),
                text: "docs".into(),
            },
        )
        .unwrap();
        let block = next.document.blocks().next().unwrap();
        assert_eq!(block.nodes.len(), 3);
        assert!(matches!(block.nodes[1], Node::Inline(_)));
        assert_eq!(block.text(), "see docshere");
    }

    // ============ Selection ops ============

    #[test]
    fn test_collapse_to_start_of_block() {
        let base = cursor_at(
            &snapshot_of(vec![Block::paragraph("one"), Block::paragraph("two")]),
            1,
            2,
        );
        let first_block_key = base.document.blocks().next().unwrap().key;
        let next = apply_op(
            &base,
            &Op::CollapseToStartOf {
                key: first_block_key,
            },
        )
        .unwrap();
        assert_eq!(next.selection.focus.offset, 0);
        assert_eq!(next.selection.focus.key, base.document.text_order()[0]);
    }

    #[test]
    fn test_selection_marks_reports_intersection() {
        let base = select(
            &snapshot_of(vec![Block::new(
                BlockType::Paragraph,
                vec![Node::Text(Text::new(vec![
                    Leaf::marked("ab", [MarkType::Bold].into_iter().collect()),
                    Leaf::marked(
                        "cd",
                        [MarkType::Bold, MarkType::Italic].into_iter().collect(),
                    ),
                ]))],
            )]),
            (0, 0),
            (0, 4),
        );
        let marks = selection_marks(&base).unwrap();
        assert!(marks.contains(&MarkType::Bold));
        assert!(!marks.contains(&MarkType::Italic));
    }
}

//! Document Host
//!
//! Mutable document model with contiguous span addressing. A span is a host
//! node plus `start..end` in content units: one unit per `char` of text and
//! one per atomic element. Annotating a span inserts typed wrapper nodes
//! around the covered content instead of markup elements, so unwrapping can
//! always put the original structure back.

use super::error::{DocumentError, Result};
use super::node::{
    push_text, ContentNode, Element, Node, NodeId, NodeKind, WrapperMark, OBJECT_REPLACEMENT,
};
use crate::annotations::AnnotationId;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed mutable document
pub struct DocumentHost {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    source: String,
}

impl std::fmt::Debug for DocumentHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHost")
            .field("source", &self.source)
            .field("nodes", &self.node_count())
            .finish()
    }
}

impl DocumentHost {
    /// Create an empty document
    ///
    /// `source` identifies the document (e.g. the spine item href) and is
    /// echoed in `annotation:created` events.
    pub fn new(source: impl Into<String>) -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId::new(0, 0),
            source: source.into(),
        };
        doc.root = doc.allocate(NodeKind::Root);
        doc
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    // ============================================
    // Arena
    // ============================================

    fn allocate(&mut self, kind: NodeKind) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(Node::new(kind));
            NodeId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(Node::new(kind)),
            });
            NodeId::new(index, 0)
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index() as usize) {
            if slot.generation == id.generation() && slot.node.is_some() {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index());
            }
        }
    }

    fn release_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id).into_iter().rev() {
            self.release(node);
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    fn expect_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(DocumentError::NodeNotFound(id))
    }

    // ============================================
    // Navigation
    // ============================================

    /// Whether `id` refers to a live node (it may still be detached)
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|node| &node.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the node is live and reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let Some(node) = self.node(current) else {
                return false;
            };
            if current == self.root {
                return true;
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether `ancestor` is a strict ancestor of `node`
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Pre-order traversal starting at (and including) `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// First element carrying `name="value"`
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(self.root).into_iter().find(|id| {
            self.kind(*id)
                .and_then(NodeKind::as_element)
                .and_then(|element| element.attribute(name))
                == Some(value)
        })
    }

    pub fn wrapper_mark(&self, id: NodeId) -> Option<&WrapperMark> {
        self.kind(id).and_then(NodeKind::as_wrapper)
    }

    pub(crate) fn wrapper_mark_mut(&mut self, id: NodeId) -> Option<&mut WrapperMark> {
        match self.node_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Wrapper(mark)) => Some(mark),
            _ => None,
        }
    }

    /// Number of wrapper segments reachable from the root
    pub fn wrapper_count(&self) -> usize {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.wrapper_mark(*id).is_some())
            .count()
    }

    // ============================================
    // Building
    // ============================================

    fn ensure_container(&self, id: NodeId) -> Result<()> {
        match &self.expect_node(id)?.kind {
            NodeKind::Root | NodeKind::Wrapper(_) => Ok(()),
            NodeKind::Element(element) if !element.is_atomic() => Ok(()),
            _ => Err(DocumentError::InvalidHost(id)),
        }
    }

    fn attach_child(&mut self, parent: NodeId, index: Option<usize>, child: NodeId) {
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            match index {
                Some(index) => {
                    let index = index.min(node.children.len());
                    node.children.insert(index, child);
                }
                None => node.children.push(child),
            }
        }
    }

    fn detach(&mut self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        let index = self.children(parent).iter().position(|c| *c == child)?;
        if let Some(node) = self.node_mut(parent) {
            node.children.remove(index);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
        Some(index)
    }

    /// Append an element to `parent`
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> Result<NodeId> {
        self.ensure_container(parent)?;
        let id = self.allocate(NodeKind::Element(element));
        self.attach_child(parent, None, id);
        Ok(id)
    }

    /// Append text to `parent`, extending a trailing text run if present
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Result<NodeId> {
        self.ensure_container(parent)?;
        if let Some(last) = self.children(parent).last().copied() {
            if let Some(NodeKind::Text(existing)) = self.node_mut(last).map(|node| &mut node.kind) {
                existing.push_str(text);
                return Ok(last);
            }
        }
        let id = self.allocate(NodeKind::Text(text.to_string()));
        self.attach_child(parent, None, id);
        Ok(id)
    }

    /// Destroy a subtree
    ///
    /// Every id inside the subtree becomes stale; its slot generation is
    /// bumped before reuse.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(DocumentError::RootRemoval);
        }
        self.expect_node(id)?;
        let parent = self.parent(id);
        self.detach(id);
        self.release_subtree(id);
        if let Some(parent) = parent {
            self.normalize(parent);
        }
        Ok(())
    }

    // ============================================
    // Measurement
    // ============================================

    /// Content length in units
    pub fn content_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            None => 0,
            Some(node) => match &node.kind {
                NodeKind::Text(text) => text.chars().count(),
                NodeKind::Element(element) if element.is_atomic() => 1,
                _ => node.children.iter().map(|child| self.content_len(*child)).sum(),
            },
        }
    }

    /// Extracted text, atomic elements as U+FFFC
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(element) if element.is_atomic() => out.push(OBJECT_REPLACEMENT),
            _ => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Text of `start..end` inside `host`
    pub fn text_range(&self, host: NodeId, start: usize, end: usize) -> Result<String> {
        self.check_range(host, start, end)?;
        Ok(self
            .text_content(host)
            .chars()
            .skip(start)
            .take(end - start)
            .collect())
    }

    /// Validate that `host` can address spans
    pub fn check_host(&self, host: NodeId) -> Result<()> {
        match &self.expect_node(host)?.kind {
            NodeKind::Root => {}
            NodeKind::Element(element) if !element.is_atomic() => {}
            _ => return Err(DocumentError::InvalidHost(host)),
        }
        if !self.is_attached(host) {
            return Err(DocumentError::Detached(host));
        }
        Ok(())
    }

    fn check_range(&self, host: NodeId, start: usize, end: usize) -> Result<usize> {
        self.check_host(host)?;
        let len = self.content_len(host);
        if start > end || end > len {
            return Err(DocumentError::OutOfBounds { start, end, len });
        }
        Ok(len)
    }

    /// Offset of `node` relative to the start of `host`
    pub fn offset_of(&self, host: NodeId, node: NodeId) -> Option<usize> {
        if !self.contains(node) {
            return None;
        }
        let mut offset = 0;
        let mut current = node;
        while current != host {
            let parent = self.parent(current)?;
            for sibling in self.children(parent) {
                if *sibling == current {
                    break;
                }
                offset += self.content_len(*sibling);
            }
            current = parent;
        }
        Some(offset)
    }

    /// Leaves (text runs and atomic elements) overlapping `start..end`
    pub fn leaves_in(&self, host: NodeId, start: usize, end: usize) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(host, 0, start, end, &mut out);
        out
    }

    fn collect_leaves(
        &self,
        node: NodeId,
        base: usize,
        start: usize,
        end: usize,
        out: &mut Vec<NodeId>,
    ) {
        let mut offset = base;
        for &child in self.children(node) {
            let len = self.content_len(child);
            let (child_start, child_end) = (offset, offset + len);
            offset = child_end;
            if len == 0 || child_start >= end || child_end <= start {
                continue;
            }
            match self.kind(child) {
                Some(NodeKind::Text(_)) => out.push(child),
                Some(NodeKind::Element(element)) if element.is_atomic() => out.push(child),
                _ => self.collect_leaves(child, child_start, start, end, out),
            }
        }
    }

    /// Annotations whose wrappers cover any unit of `start..end`
    ///
    /// Host-scoped: only the leaves inside the range and their ancestors are
    /// visited.
    pub fn overlapping_wrappers(
        &self,
        host: NodeId,
        start: usize,
        end: usize,
    ) -> Vec<AnnotationId> {
        let mut found: Vec<AnnotationId> = Vec::new();
        for leaf in self.leaves_in(host, start, end) {
            let mut current = self.parent(leaf);
            while let Some(id) = current {
                if let Some(mark) = self.wrapper_mark(id) {
                    if !found.contains(&mark.annotation_id) {
                        found.push(mark.annotation_id.clone());
                    }
                }
                current = self.parent(id);
            }
        }
        found
    }

    // ============================================
    // Fragments
    // ============================================

    /// Structural copy of `start..end` with wrappers flattened
    pub fn fragment(&self, host: NodeId, start: usize, end: usize) -> Result<Vec<ContentNode>> {
        self.check_range(host, start, end)?;
        let mut out = Vec::new();
        self.clone_range(host, 0, start, end, &mut out);
        Ok(out)
    }

    /// Structural copy of a whole subtree with wrappers flattened
    pub fn snapshot(&self, id: NodeId) -> Vec<ContentNode> {
        let mut out = Vec::new();
        self.clone_node(id, &mut out);
        out
    }

    fn clone_node(&self, id: NodeId, out: &mut Vec<ContentNode>) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => push_text(out, text),
            NodeKind::Element(element) => {
                let mut children = Vec::new();
                for child in &node.children {
                    self.clone_node(*child, &mut children);
                }
                out.push(ContentNode::Element {
                    tag: element.tag.clone(),
                    attributes: element.attributes.clone(),
                    self_closing: element.self_closing,
                    children,
                });
            }
            NodeKind::Wrapper(_) | NodeKind::Root => {
                for child in &node.children {
                    self.clone_node(*child, out);
                }
            }
        }
    }

    fn clone_range(
        &self,
        node: NodeId,
        base: usize,
        start: usize,
        end: usize,
        out: &mut Vec<ContentNode>,
    ) {
        let mut offset = base;
        for &child in self.children(node) {
            let len = self.content_len(child);
            let (child_start, child_end) = (offset, offset + len);
            offset = child_end;
            if len == 0 {
                if child_start > start && child_start < end {
                    self.clone_node(child, out);
                }
                continue;
            }
            if child_end <= start || child_start >= end {
                continue;
            }
            match self.kind(child) {
                Some(NodeKind::Text(text)) => {
                    let from = start.max(child_start) - child_start;
                    let to = end.min(child_end) - child_start;
                    let slice: String = text.chars().skip(from).take(to - from).collect();
                    push_text(out, &slice);
                }
                Some(NodeKind::Element(element)) if element.is_atomic() => {
                    self.clone_node(child, out)
                }
                Some(NodeKind::Element(element)) => {
                    let mut children = Vec::new();
                    self.clone_range(child, child_start, start, end, &mut children);
                    out.push(ContentNode::Element {
                        tag: element.tag.clone(),
                        attributes: element.attributes.clone(),
                        self_closing: element.self_closing,
                        children,
                    });
                }
                Some(NodeKind::Wrapper(_)) | Some(NodeKind::Root) => {
                    self.clone_range(child, child_start, start, end, out)
                }
                None => {}
            }
        }
    }

    // ============================================
    // Wrapping
    // ============================================

    fn split_text_node(&mut self, id: NodeId, at: usize) -> Option<NodeId> {
        if at == 0 {
            return None;
        }
        let parent = self.parent(id)?;
        let right = match self.node_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Text(text)) => {
                let byte = text.char_indices().nth(at).map(|(byte, _)| byte)?;
                text.split_off(byte)
            }
            _ => return None,
        };
        let index = self.children(parent).iter().position(|c| *c == id)?;
        let new = self.allocate(NodeKind::Text(right));
        self.attach_child(parent, Some(index + 1), new);
        Some(new)
    }

    /// Ensure a node boundary exists at `position`, splitting a text run
    fn split_at(&mut self, host: NodeId, position: usize) {
        let mut current = host;
        let mut pos = position;
        loop {
            let mut offset = 0;
            let mut target = None;
            for &child in self.children(current) {
                let len = self.content_len(child);
                if pos > offset && pos < offset + len {
                    target = Some((child, pos - offset));
                    break;
                }
                offset += len;
            }
            let Some((child, inner)) = target else {
                return;
            };
            if self.kind(child).map_or(false, NodeKind::is_text) {
                self.split_text_node(child, inner);
                return;
            }
            current = child;
            pos = inner;
        }
    }

    /// Maximal subtrees lying entirely inside `start..end`, in document order
    fn collect_contained(
        &self,
        node: NodeId,
        base: usize,
        start: usize,
        end: usize,
        out: &mut Vec<NodeId>,
    ) {
        let mut offset = base;
        for &child in self.children(node) {
            let len = self.content_len(child);
            let (child_start, child_end) = (offset, offset + len);
            offset = child_end;
            if len == 0 {
                if child_start > start && child_start < end {
                    out.push(child);
                }
            } else if child_start >= start && child_end <= end {
                out.push(child);
            } else if child_start < end && child_end > start {
                self.collect_contained(child, child_start, start, end, out);
            }
        }
    }

    /// Wrap `start..end` of `host` in wrapper segments tagged with `mark`
    ///
    /// Text runs are split at the range boundaries, then every maximal run of
    /// contiguous sibling subtrees inside the range is moved into its own
    /// wrapper. A range within a single parent yields exactly one segment.
    /// All validation happens before the first mutation.
    pub fn wrap_range(
        &mut self,
        host: NodeId,
        start: usize,
        end: usize,
        mark: WrapperMark,
    ) -> Result<Vec<NodeId>> {
        let len = self.check_range(host, start, end)?;
        if start == end {
            return Err(DocumentError::OutOfBounds { start, end, len });
        }

        self.split_at(host, end);
        self.split_at(host, start);

        let mut contained = Vec::new();
        self.collect_contained(host, 0, start, end, &mut contained);

        // (parent, index of first node, nodes)
        let mut runs: Vec<(NodeId, usize, Vec<NodeId>)> = Vec::new();
        for node in contained {
            let Some(parent) = self.parent(node) else {
                continue;
            };
            let Some(index) = self.children(parent).iter().position(|c| *c == node) else {
                continue;
            };
            let extends = matches!(
                runs.last(),
                Some((last_parent, first, nodes))
                    if *last_parent == parent && first + nodes.len() == index
            );
            match runs.last_mut() {
                Some((_, _, nodes)) if extends => nodes.push(node),
                _ => runs.push((parent, index, vec![node])),
            }
        }

        let mut segments = Vec::with_capacity(runs.len());
        for (parent, first, nodes) in runs.into_iter().rev() {
            let wrapper = self.allocate(NodeKind::Wrapper(mark.clone()));
            if let Some(node) = self.node_mut(parent) {
                node.children
                    .splice(first..first + nodes.len(), std::iter::once(wrapper));
            }
            for &moved in &nodes {
                if let Some(node) = self.node_mut(moved) {
                    node.parent = Some(wrapper);
                }
            }
            if let Some(node) = self.node_mut(wrapper) {
                node.parent = Some(parent);
                node.children = nodes;
            }
            segments.push(wrapper);
        }
        segments.reverse();
        Ok(segments)
    }

    /// Replace a wrapper with its children and merge adjacent text runs
    pub fn unwrap_wrapper(&mut self, wrapper: NodeId) -> Result<()> {
        let node = self.expect_node(wrapper)?;
        if !matches!(node.kind, NodeKind::Wrapper(_)) {
            return Err(DocumentError::NotAWrapper(wrapper));
        }
        let parent = node.parent.ok_or(DocumentError::Detached(wrapper))?;
        let index = self
            .children(parent)
            .iter()
            .position(|c| *c == wrapper)
            .ok_or(DocumentError::Detached(wrapper))?;

        let children = self
            .node_mut(wrapper)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default();
        for &child in &children {
            if let Some(node) = self.node_mut(child) {
                node.parent = Some(parent);
            }
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.splice(index..index + 1, children);
        }
        self.release(wrapper);
        self.normalize(parent);
        Ok(())
    }

    /// Merge adjacent text children of `parent` and drop empty ones
    pub fn normalize(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        let mut released = Vec::new();

        for child in children {
            let text = match self.kind(child) {
                Some(NodeKind::Text(text)) => Some(text.clone()),
                _ => None,
            };
            match text {
                Some(text) if text.is_empty() => released.push(child),
                Some(text) => {
                    if let Some(&previous) = kept.last() {
                        if let Some(NodeKind::Text(previous_text)) =
                            self.node_mut(previous).map(|node| &mut node.kind)
                        {
                            previous_text.push_str(&text);
                            released.push(child);
                            continue;
                        }
                    }
                    kept.push(child);
                }
                None => kept.push(child),
            }
        }

        if let Some(node) = self.node_mut(parent) {
            node.children = kept;
        }
        for id in released {
            self.release(id);
        }
    }

    // ============================================
    // Text edits
    // ============================================

    /// Insert text at `offset` of `host`
    ///
    /// Offsets falling on a node boundary insert at the shallowest level, so
    /// typing right before or after an annotated span never extends it.
    pub fn insert_text(&mut self, host: NodeId, offset: usize, text: &str) -> Result<()> {
        self.check_range(host, offset, offset)?;
        if text.is_empty() {
            return Ok(());
        }

        let mut current = host;
        let mut pos = offset;
        'descend: loop {
            let children = self.children(current).to_vec();
            let mut acc = 0;
            for (index, &child) in children.iter().enumerate() {
                let len = self.content_len(child);
                if pos == acc {
                    self.insert_text_at(current, index, text);
                    return Ok(());
                }
                if pos < acc + len {
                    if let Some(NodeKind::Text(existing)) =
                        self.node_mut(child).map(|node| &mut node.kind)
                    {
                        let byte = existing
                            .char_indices()
                            .nth(pos - acc)
                            .map(|(byte, _)| byte)
                            .unwrap_or(existing.len());
                        existing.insert_str(byte, text);
                        return Ok(());
                    }
                    current = child;
                    pos -= acc;
                    continue 'descend;
                }
                acc += len;
            }
            self.insert_text_at(current, children.len(), text);
            return Ok(());
        }
    }

    fn insert_text_at(&mut self, parent: NodeId, index: usize, text: &str) {
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied());
        if let Some(previous) = previous {
            if let Some(NodeKind::Text(existing)) =
                self.node_mut(previous).map(|node| &mut node.kind)
            {
                existing.push_str(text);
                return;
            }
        }
        let next = self.children(parent).get(index).copied();
        if let Some(next) = next {
            if let Some(NodeKind::Text(existing)) = self.node_mut(next).map(|node| &mut node.kind) {
                existing.insert_str(0, text);
                return;
            }
        }
        let id = self.allocate(NodeKind::Text(text.to_string()));
        self.attach_child(parent, Some(index), id);
    }

    /// Delete `start..end` of `host`
    ///
    /// Subtrees entirely inside the range are destroyed, including wrapper
    /// segments, which invalidates the anchors they belonged to.
    pub fn delete_text(&mut self, host: NodeId, start: usize, end: usize) -> Result<()> {
        self.check_range(host, start, end)?;
        if start == end {
            return Ok(());
        }

        self.split_at(host, end);
        self.split_at(host, start);

        let mut contained = Vec::new();
        self.collect_contained(host, 0, start, end, &mut contained);

        let mut touched: Vec<NodeId> = Vec::new();
        for node in contained {
            if let Some(parent) = self.parent(node) {
                self.detach(node);
                self.release_subtree(node);
                if !touched.contains(&parent) {
                    touched.push(parent);
                }
            }
        }

        for parent in touched {
            if !self.contains(parent) {
                continue;
            }
            self.normalize(parent);
            let emptied_wrapper =
                self.wrapper_mark(parent).is_some() && self.children(parent).is_empty();
            if emptied_wrapper {
                let grandparent = self.parent(parent);
                self.detach(parent);
                self.release(parent);
                if let Some(grandparent) = grandparent {
                    self.normalize(grandparent);
                }
            }
        }
        Ok(())
    }
}

//! Anchor types

use serde::{Deserialize, Serialize};

use crate::annotations::AnnotationId;
use crate::document::{DocumentHost, NodeId};

/// A span as delivered by a selection source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub host: NodeId,
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(host: NodeId, start: usize, end: usize) -> Self {
        Self { host, start, end }
    }
}

/// Length limits applied to trimmed selection text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConstraints {
    #[serde(rename = "minLen")]
    pub min_len: usize,
    #[serde(rename = "maxLen")]
    pub max_len: usize,
}

impl Default for SelectionConstraints {
    fn default() -> Self {
        Self {
            min_len: 1,
            max_len: 2000,
        }
    }
}

impl SelectionConstraints {
    /// Constraints that accept any non-empty selection
    pub fn unbounded() -> Self {
        Self {
            min_len: 1,
            max_len: usize::MAX,
        }
    }
}

/// Validated, not yet wrapped span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub host: NodeId,
    pub start: usize,
    pub end: usize,
    /// Text covered by the span when it was validated
    pub text: String,
}

impl Anchor {
    pub fn span(&self) -> TextSpan {
        TextSpan::new(self.host, self.start, self.end)
    }
}

/// Anchor committed to the document as wrapper segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedAnchor {
    pub id: AnnotationId,
    pub host: NodeId,
    /// Wrapper nodes in document order
    pub segments: Vec<NodeId>,
}

impl WrappedAnchor {
    /// Every segment is still an attached wrapper of this annotation under
    /// the host
    pub fn is_live(&self, doc: &DocumentHost) -> bool {
        if self.segments.is_empty() || doc.check_host(self.host).is_err() {
            return false;
        }
        self.segments.iter().all(|segment| {
            doc.wrapper_mark(*segment)
                .map_or(false, |mark| mark.annotation_id == self.id)
                && doc.is_ancestor(self.host, *segment)
        })
    }

    /// Current `start..end` inside the host
    pub fn range(&self, doc: &DocumentHost) -> Option<(usize, usize)> {
        if !self.is_live(doc) {
            return None;
        }
        let first = *self.segments.first()?;
        let last = *self.segments.last()?;
        let start = doc.offset_of(self.host, first)?;
        let end = doc.offset_of(self.host, last)? + doc.content_len(last);
        Some((start, end))
    }

    /// Current covered text
    pub fn text(&self, doc: &DocumentHost) -> Option<String> {
        let (start, end) = self.range(doc)?;
        doc.text_range(self.host, start, end).ok()
    }

    /// Snapshot as an unwrapped anchor
    pub fn to_anchor(&self, doc: &DocumentHost) -> Option<Anchor> {
        let (start, end) = self.range(doc)?;
        let text = doc.text_range(self.host, start, end).ok()?;
        Some(Anchor {
            host: self.host,
            start,
            end,
            text,
        })
    }

    /// Segment markers attach to
    pub fn primary_node(&self) -> Option<NodeId> {
        self.segments.first().copied()
    }
}

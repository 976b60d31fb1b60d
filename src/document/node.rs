//! Arena node types
//!
//! Nodes live in a slot arena owned by [`DocumentHost`](super::DocumentHost).
//! A [`NodeId`] pairs the slot index with the slot generation, so an id kept
//! after its node was destroyed never resolves to whatever reuses the slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationId, AnnotationKind};

/// Placeholder emitted for atomic elements during text extraction
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Elements that occupy exactly one content unit and have no children
pub const ATOMIC_TAGS: &[&str] = &["img", "br", "hr", "wbr", "input"];

/// HTML void elements (never pushed onto the parse stack)
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Block-level elements; a wrapper around any of these renders as `div`
pub const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "figure", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "li", "ol", "p", "pre", "section", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Generational handle to a node in the document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// A markup element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name as written in the source
    pub tag: String,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
    /// Written as `<tag/>` in the source
    pub self_closing: bool,
}

impl Element {
    /// Create an element with no attributes
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Mark as self-closing
    pub fn self_closing(mut self) -> Self {
        self.self_closing = true;
        self
    }

    /// Look up an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_atomic(&self) -> bool {
        tag_in(&self.tag, ATOMIC_TAGS)
    }

    pub fn is_void(&self) -> bool {
        tag_in(&self.tag, VOID_TAGS)
    }

    pub fn is_block(&self) -> bool {
        tag_in(&self.tag, BLOCK_TAGS)
    }
}

pub(crate) fn tag_in(tag: &str, set: &[&str]) -> bool {
    set.iter().any(|candidate| candidate.eq_ignore_ascii_case(tag))
}

/// Boundary wrapper inserted around annotated content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperMark {
    /// Annotation this wrapper belongs to
    pub annotation_id: AnnotationId,
    /// Annotation kind, written as the type attribute
    pub kind: AnnotationKind,
    /// Decoration color
    pub color: Option<String>,
    /// Payload label
    pub label: Option<String>,
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Document root
    Root,
    /// Markup element
    Element(Element),
    /// Text run
    Text(String),
    /// Annotation wrapper segment
    Wrapper(WrapperMark),
}

impl NodeKind {
    pub fn is_text(&self) -> bool {
        matches!(self, NodeKind::Text(_))
    }

    pub fn as_wrapper(&self) -> Option<&WrapperMark> {
        match self {
            NodeKind::Wrapper(mark) => Some(mark),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Detached structural copy of document content
///
/// Wrappers are transparent: a fragment taken over annotated content is
/// identical to the fragment taken before the annotation existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum ContentNode {
    Text {
        text: String,
    },
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        #[serde(rename = "selfClosing")]
        self_closing: bool,
        children: Vec<ContentNode>,
    },
}

impl ContentNode {
    /// Extracted text of this node, atomic elements as U+FFFC
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            ContentNode::Text { text } => out.push_str(text),
            ContentNode::Element { tag, children, .. } => {
                if tag_in(tag, ATOMIC_TAGS) {
                    out.push(OBJECT_REPLACEMENT);
                }
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }
}

/// Concatenated text of a fragment
pub fn fragment_text(nodes: &[ContentNode]) -> String {
    nodes.iter().map(ContentNode::text).collect()
}

/// Append text to a fragment, merging with a trailing text node
pub(crate) fn push_text(out: &mut Vec<ContentNode>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ContentNode::Text { text: last }) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(ContentNode::Text {
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_classification() {
        assert!(Element::new("IMG").is_atomic());
        assert!(Element::new("br").is_void());
        assert!(Element::new("table").is_block());
        assert!(!Element::new("em").is_block());
    }

    #[test]
    fn test_fragment_text_includes_atomic_placeholder() {
        let fragment = vec![
            ContentNode::Text {
                text: "see ".to_string(),
            },
            ContentNode::Element {
                tag: "img".to_string(),
                attributes: vec![("src".to_string(), "fig1.png".to_string())],
                self_closing: true,
                children: vec![],
            },
        ];

        assert_eq!(fragment_text(&fragment), format!("see {}", OBJECT_REPLACEMENT));
    }

    #[test]
    fn test_push_text_merges() {
        let mut out = Vec::new();
        push_text(&mut out, "Deep ");
        push_text(&mut out, "Learning");
        assert_eq!(out.len(), 1);
        assert_eq!(fragment_text(&out), "Deep Learning");
    }
}

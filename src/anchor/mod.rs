//! Anchors
//!
//! An anchor glues an annotation to a contiguous span of a host node. It is
//! a candidate ([`Anchor`]) until committed to the document as wrapper
//! segments ([`WrappedAnchor`]).

mod manager;
mod selectors;
mod types;

pub use manager::AnchorManager;
pub use selectors::{resolve_text_quote, AnnotationTarget, Selector, CONTEXT_LEN};
pub use types::{Anchor, SelectionConstraints, TextSpan, WrappedAnchor};

//! Live document model
//!
//! Arena tree with generational node ids, span addressing in content units,
//! and the wrap/unwrap/split/normalize primitives anchors are built on.

mod error;
mod host;
mod node;

pub use error::{DocumentError, Result};
pub use host::DocumentHost;
pub use node::{
    fragment_text, ContentNode, Element, NodeId, NodeKind, WrapperMark, ATOMIC_TAGS, BLOCK_TAGS,
    OBJECT_REPLACEMENT, VOID_TAGS,
};
pub(crate) use node::{push_text, tag_in};

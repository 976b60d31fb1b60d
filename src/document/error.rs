//! Document host error types

use thiserror::Error;

use super::node::NodeId;

/// Errors raised by Document Host primitives
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Node id is unknown or its slot was reused
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node exists but is no longer reachable from the document root
    #[error("Node is detached from the document: {0}")]
    Detached(NodeId),

    /// Node cannot contain a span (text node, atomic element, wrapper)
    #[error("Node cannot host a span: {0}")]
    InvalidHost(NodeId),

    /// Range does not fit inside the host content
    #[error("Range {start}..{end} out of bounds (host length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    /// Node is not an annotation wrapper
    #[error("Node is not an annotation wrapper: {0}")]
    NotAWrapper(NodeId),

    /// The root node cannot be removed
    #[error("Cannot remove the document root")]
    RootRemoval,

    /// Failed to parse markup
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to sanitize markup
    #[error("Sanitize error: {0}")]
    SanitizeError(String),

    /// IO error (std::io::Error)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

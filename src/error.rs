//! Error types for the annotation engine

use thiserror::Error;

use crate::document::DocumentError;
use crate::reconcile::AnnotationState;

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, AnchorError>;

/// Annotation engine error type
#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Invalid selection: {0}")]
    InvalidSelection(#[from] SelectionRejection),

    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("Marker creation failed: {0}")]
    MarkerCreationFailed(String),

    #[error("Registry conflict: {0}")]
    RegistryConflict(String),

    #[error("Annotation {id} is busy ({state})")]
    Busy { id: String, state: AnnotationState },

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

impl AnchorError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AnchorError::InvalidSelection(_) => "invalid_selection",
            AnchorError::AnchorNotFound(_) => "anchor_not_found",
            AnchorError::MarkerCreationFailed(_) => "marker_creation_failed",
            AnchorError::RegistryConflict(_) => "registry_conflict",
            AnchorError::Busy { .. } => "busy",
            AnchorError::Document(_) => "document_error",
        }
    }
}

/// Why a selection cannot become an anchor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionRejection {
    #[error("selection is empty")]
    Collapsed,

    #[error("selection has {len} characters, minimum is {min}")]
    TooShort { len: usize, min: usize },

    #[error("selection has {len} characters, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("selection ends at {end}, host length is {len}")]
    OutOfBounds { end: usize, len: usize },

    #[error("selection text {actual:?} does not match {expected:?}")]
    TextMismatch { expected: String, actual: String },

    #[error("selection overlaps annotation {existing}")]
    Overlap { existing: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_converts_and_displays() {
        let error: AnchorError = SelectionRejection::TooShort { len: 2, min: 5 }.into();

        assert_eq!(error.code(), "invalid_selection");
        assert_eq!(
            error.to_string(),
            "Invalid selection: selection has 2 characters, minimum is 5"
        );
    }

    #[test]
    fn test_busy_display() {
        let error = AnchorError::Busy {
            id: "h1".to_string(),
            state: AnnotationState::PendingDelete,
        };

        assert_eq!(error.code(), "busy");
        assert_eq!(error.to_string(), "Annotation h1 is busy (pending-delete)");
    }
}

//! Reconciliation requests, reports and per-annotation state

use std::fmt;

use serde::Serialize;

use crate::anchor::{SelectionConstraints, TextSpan};
use crate::annotations::{AnnotationId, AnnotationPayload};
use crate::document::ContentNode;

/// Lifecycle state of a registered annotation
///
/// `Removed` is terminal and represented by the entry being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationState {
    Active,
    PendingDelete,
    PendingUpdate,
}

impl fmt::Display for AnnotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnnotationState::Active => "active",
            AnnotationState::PendingDelete => "pending-delete",
            AnnotationState::PendingUpdate => "pending-update",
        };
        f.write_str(name)
    }
}

/// Selection turned into an annotation
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Generated when absent
    pub id: Option<AnnotationId>,
    pub span: TextSpan,
    /// Text the selection source saw, checked against the document
    pub text: Option<String>,
    pub payload: AnnotationPayload,
    /// Overrides the configured constraints
    pub constraints: Option<SelectionConstraints>,
}

impl CreateRequest {
    pub fn new(span: TextSpan, payload: AnnotationPayload) -> Self {
        Self {
            id: None,
            span,
            text: None,
            payload,
            constraints: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<AnnotationId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_constraints(mut self, constraints: SelectionConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// Move and/or restyle an annotation
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub id: AnnotationId,
    pub span: Option<TextSpan>,
    pub payload: Option<AnnotationPayload>,
}

impl UpdateRequest {
    pub fn new(id: impl Into<AnnotationId>) -> Self {
        Self {
            id: id.into(),
            span: None,
            payload: None,
        }
    }

    pub fn with_span(mut self, span: TextSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_payload(mut self, payload: AnnotationPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Outcome of a delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub id: AnnotationId,
    /// Set when the anchor could not be unwrapped; cleanup still ran
    #[serde(rename = "unwrapError", skip_serializing_if = "Option::is_none")]
    pub unwrap_error: Option<String>,
    /// Content the anchor covered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentNode>>,
    #[serde(rename = "markerRemoved")]
    pub marker_removed: bool,
    pub unregistered: bool,
}

/// Outcome of a frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    /// Annotations deleted because their anchors died
    pub swept: Vec<AnnotationId>,
    #[serde(rename = "markersCreated")]
    pub markers_created: usize,
    /// Deferred tasks whose annotation or anchor was gone
    pub skipped: usize,
}

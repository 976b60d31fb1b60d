//! Marker types and the per-kind behavior trait

use std::fmt;

use serde::Serialize;

use crate::annotations::{Annotation, AnnotationId, AnnotationKind};
use crate::document::NodeId;
use crate::html::HighlightConfig;

/// Marker identifier, monotonic per coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MarkerId(u64);

impl MarkerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Visual description of a marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerDecoration {
    pub classes: Vec<String>,
    pub label: String,
    pub color: String,
    /// Short extra text shown next to the label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

/// Decorated widget bound to one annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub id: MarkerId,
    #[serde(rename = "annotationId")]
    pub annotation_id: AnnotationId,
    pub kind: AnnotationKind,
    /// Wrapper segment the marker is attached to
    #[serde(rename = "attachedTo")]
    pub attached_to: NodeId,
    pub decoration: MarkerDecoration,
    pub active: bool,
}

/// Kind-specific marker capabilities
pub trait MarkerBehavior {
    /// Annotation kind this behavior serves
    fn kind(&self) -> AnnotationKind;

    /// Build the decoration for an annotation
    fn create_marker(&self, annotation: &Annotation, config: &HighlightConfig) -> MarkerDecoration;

    fn on_activate(&self, marker: &mut Marker) {
        marker.active = true;
    }

    fn on_deactivate(&self, marker: &mut Marker) {
        marker.active = false;
    }
}

//! Annotation lifecycle events

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::annotations::{AnnotationId, AnnotationKind, AnnotationPayload};

pub const ANNOTATION_CREATED: &str = "annotation:created";
pub const ANNOTATION_UPDATED: &str = "annotation:updated";
pub const ANNOTATION_REMOVED: &str = "annotation:removed";
pub const ANNOTATION_ERROR: &str = "annotation:error";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: AnnotationId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub payload: AnnotationPayload,
    pub timestamp: DateTime<Utc>,
    /// Source document
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedEvent {
    pub id: AnnotationId,
    pub text: String,
    pub payload: AnnotationPayload,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedEvent {
    pub id: AnnotationId,
    pub timestamp: DateTime<Utc>,
}

/// Non-fatal failure notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub id: AnnotationId,
    /// Operation that failed (`create`, `update`, `delete`, `sweep`)
    pub operation: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload carried on the annotation bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnnotationEvent {
    Created(CreatedEvent),
    Updated(UpdatedEvent),
    Removed(RemovedEvent),
    Error(ErrorEvent),
}

impl AnnotationEvent {
    pub fn created(
        id: AnnotationId,
        text: String,
        payload: AnnotationPayload,
        source: impl Into<String>,
    ) -> Self {
        AnnotationEvent::Created(CreatedEvent {
            id,
            text,
            kind: payload.kind(),
            payload,
            timestamp: Utc::now(),
            source: source.into(),
        })
    }

    pub fn updated(id: AnnotationId, text: String, payload: AnnotationPayload) -> Self {
        AnnotationEvent::Updated(UpdatedEvent {
            id,
            text,
            payload,
            timestamp: Utc::now(),
        })
    }

    pub fn removed(id: AnnotationId) -> Self {
        AnnotationEvent::Removed(RemovedEvent {
            id,
            timestamp: Utc::now(),
        })
    }

    pub fn error(
        id: AnnotationId,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AnnotationEvent::Error(ErrorEvent {
            id,
            operation: operation.into(),
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    /// Bus event name
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationEvent::Created(_) => ANNOTATION_CREATED,
            AnnotationEvent::Updated(_) => ANNOTATION_UPDATED,
            AnnotationEvent::Removed(_) => ANNOTATION_REMOVED,
            AnnotationEvent::Error(_) => ANNOTATION_ERROR,
        }
    }

    pub fn id(&self) -> &AnnotationId {
        match self {
            AnnotationEvent::Created(e) => &e.id,
            AnnotationEvent::Updated(e) => &e.id,
            AnnotationEvent::Removed(e) => &e.id,
            AnnotationEvent::Error(e) => &e.id,
        }
    }
}

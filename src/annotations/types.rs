//! Annotation types
//!
//! An annotation is a typed payload bound to an anchor in a live document.
//! The payload variant always matches the annotation kind, so kind-specific
//! fields are checked at construction instead of at every read.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anchor::Anchor;
use crate::markers::MarkerId;

/// Default highlight color
pub const DEFAULT_COLOR: &str = "#ffff00";

/// Opaque annotation identifier
///
/// Caller-supplied or a generated UUID. An id is never reused while any
/// reference to it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh UUID v4 id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AnnotationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for AnnotationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AnnotationId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AnnotationId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Kinds of annotated content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    /// Text span
    Text,
    /// Image (or figure)
    Image,
    /// Table
    Table,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Text => "text",
            AnnotationKind::Image => "image",
            AnnotationKind::Table => "table",
        }
    }

    pub const ALL: [AnnotationKind; 3] = [
        AnnotationKind::Text,
        AnnotationKind::Image,
        AnnotationKind::Table,
    ];
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a text label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    /// Typed by the user
    #[default]
    Manual,
    /// Accepted from a suggestion
    Suggested,
    /// Carried over from an import
    Imported,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// Metadata for a text annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub label: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// Suggestion confidence (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub source: LabelSource,
}

/// Metadata for an image annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub label: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(rename = "altText", default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Metadata for a table annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    pub label: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
}

/// Kind-specific annotation metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationPayload {
    Text(TextPayload),
    Image(ImagePayload),
    Table(TablePayload),
}

impl AnnotationPayload {
    /// Text payload with the default color
    pub fn text(label: impl Into<String>) -> Self {
        AnnotationPayload::Text(TextPayload {
            label: label.into(),
            color: default_color(),
            confidence: None,
            source: LabelSource::Manual,
        })
    }

    /// Image payload with the default color
    pub fn image(label: impl Into<String>) -> Self {
        AnnotationPayload::Image(ImagePayload {
            label: label.into(),
            color: default_color(),
            alt_text: None,
            caption: None,
        })
    }

    /// Table payload with the default color
    pub fn table(label: impl Into<String>) -> Self {
        AnnotationPayload::Table(TablePayload {
            label: label.into(),
            color: default_color(),
            caption: None,
            rows: None,
            columns: None,
        })
    }

    /// Replace the color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        let color = color.into();
        match &mut self {
            AnnotationPayload::Text(p) => p.color = color,
            AnnotationPayload::Image(p) => p.color = color,
            AnnotationPayload::Table(p) => p.color = color,
        }
        self
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationPayload::Text(_) => AnnotationKind::Text,
            AnnotationPayload::Image(_) => AnnotationKind::Image,
            AnnotationPayload::Table(_) => AnnotationKind::Table,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            AnnotationPayload::Text(p) => &p.label,
            AnnotationPayload::Image(p) => &p.label,
            AnnotationPayload::Table(p) => &p.label,
        }
    }

    pub fn color(&self) -> &str {
        match self {
            AnnotationPayload::Text(p) => &p.color,
            AnnotationPayload::Image(p) => &p.color,
            AnnotationPayload::Table(p) => &p.color,
        }
    }
}

/// A live annotation
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    /// Anchor as of the last commit
    pub anchor: Anchor,
    pub payload: AnnotationPayload,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Marker back-reference
    #[serde(rename = "markerId", skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<MarkerId>,
}

impl Annotation {
    /// Create an annotation; the kind follows the payload
    pub fn new(id: AnnotationId, anchor: Anchor, payload: AnnotationPayload) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: payload.kind(),
            anchor,
            payload,
            created_at: now,
            updated_at: now,
            marker_id: None,
        }
    }
}

/// Partial update merged by the registry
#[derive(Debug, Clone, Default)]
pub struct AnnotationPatch {
    pub anchor: Option<Anchor>,
    pub payload: Option<AnnotationPayload>,
}

impl AnnotationPatch {
    pub fn anchor(anchor: Anchor) -> Self {
        Self {
            anchor: Some(anchor),
            payload: None,
        }
    }

    pub fn payload(payload: AnnotationPayload) -> Self {
        Self {
            anchor: None,
            payload: Some(payload),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor.is_none() && self.payload.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_id_borrow() {
        let id = AnnotationId::new("h1");
        let mut map = std::collections::HashMap::new();
        map.insert(id.clone(), 1);

        assert_eq!(map.get("h1"), Some(&1));
        assert_eq!(id, "h1");
        assert_ne!(AnnotationId::generate(), AnnotationId::generate());
    }

    #[test]
    fn test_payload_serialization() {
        let payload = AnnotationPayload::text("Method");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["label"], "Method");
        assert_eq!(json["color"], DEFAULT_COLOR);
        assert_eq!(json["source"], "manual");
    }

    #[test]
    fn test_payload_deserialization_defaults() {
        let payload: AnnotationPayload =
            serde_json::from_str(r#"{"type": "table", "label": "Results", "rows": 4}"#).unwrap();

        assert_eq!(payload.kind(), AnnotationKind::Table);
        assert_eq!(payload.color(), DEFAULT_COLOR);
        match payload {
            AnnotationPayload::Table(table) => assert_eq!(table.rows, Some(4)),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_with_color() {
        let payload = AnnotationPayload::image("Figure").with_color("#00ff00");
        assert_eq!(payload.color(), "#00ff00");
        assert_eq!(payload.label(), "Figure");
    }
}

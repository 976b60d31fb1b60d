//! Built-in marker behaviors

use super::marker::{Marker, MarkerBehavior, MarkerDecoration};
use crate::annotations::{Annotation, AnnotationKind, AnnotationPayload};
use crate::html::HighlightConfig;

const ACTIVE_CLASS: &str = "is-active";

fn base_decoration(annotation: &Annotation, config: &HighlightConfig) -> MarkerDecoration {
    MarkerDecoration {
        classes: config
            .class_for(annotation.kind)
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        label: annotation.payload.label().to_string(),
        color: annotation.payload.color().to_string(),
        badge: None,
    }
}

fn set_active(marker: &mut Marker, active: bool) {
    marker.active = active;
    marker.decoration.classes.retain(|class| class != ACTIVE_CLASS);
    if active {
        marker.decoration.classes.push(ACTIVE_CLASS.to_string());
    }
}

/// Text highlight marker
#[derive(Debug, Default)]
pub struct HighlightMarker;

impl MarkerBehavior for HighlightMarker {
    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Text
    }

    fn create_marker(&self, annotation: &Annotation, config: &HighlightConfig) -> MarkerDecoration {
        let mut decoration = base_decoration(annotation, config);
        if let AnnotationPayload::Text(text) = &annotation.payload {
            decoration.badge = text
                .confidence
                .map(|confidence| format!("{:.0}%", confidence * 100.0));
        }
        decoration
    }

    fn on_activate(&self, marker: &mut Marker) {
        set_active(marker, true);
    }

    fn on_deactivate(&self, marker: &mut Marker) {
        set_active(marker, false);
    }
}

/// Image marker, badged with the caption or alt text
#[derive(Debug, Default)]
pub struct ImageMarker;

impl MarkerBehavior for ImageMarker {
    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Image
    }

    fn create_marker(&self, annotation: &Annotation, config: &HighlightConfig) -> MarkerDecoration {
        let mut decoration = base_decoration(annotation, config);
        if let AnnotationPayload::Image(image) = &annotation.payload {
            decoration.badge = image.caption.clone().or_else(|| image.alt_text.clone());
        }
        decoration
    }

    fn on_activate(&self, marker: &mut Marker) {
        set_active(marker, true);
    }

    fn on_deactivate(&self, marker: &mut Marker) {
        set_active(marker, false);
    }
}

/// Table marker, badged with the table dimensions
#[derive(Debug, Default)]
pub struct TableMarker;

impl MarkerBehavior for TableMarker {
    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Table
    }

    fn create_marker(&self, annotation: &Annotation, config: &HighlightConfig) -> MarkerDecoration {
        let mut decoration = base_decoration(annotation, config);
        if let AnnotationPayload::Table(table) = &annotation.payload {
            decoration.badge = match (table.rows, table.columns) {
                (Some(rows), Some(columns)) => Some(format!("{}×{}", rows, columns)),
                _ => table.caption.clone(),
            };
        }
        decoration
    }

    fn on_activate(&self, marker: &mut Marker) {
        set_active(marker, true);
    }

    fn on_deactivate(&self, marker: &mut Marker) {
        set_active(marker, false);
    }
}

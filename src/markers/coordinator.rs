//! Marker lifecycle
//!
//! Keeps at most one marker per annotation and reconciles the marker set
//! against the authoritative annotation list.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use super::kinds::{HighlightMarker, ImageMarker, TableMarker};
use super::marker::{Marker, MarkerBehavior, MarkerId};
use crate::anchor::AnchorManager;
use crate::annotations::{Annotation, AnnotationId, AnnotationKind};
use crate::document::DocumentHost;
use crate::error::{AnchorError, Result};
use crate::html::HighlightConfig;

/// Actions taken by [`MarkerLifecycleCoordinator::sync`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    /// Markers moved to a replacement wrapper
    pub reattached: usize,
    pub removed: usize,
    /// Annotations whose anchors could not be located
    pub failed: usize,
}

impl SyncReport {
    /// No marker was created, moved or removed
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.reattached == 0 && self.removed == 0
    }
}

/// Owns every marker and the behavior for each annotation kind
pub struct MarkerLifecycleCoordinator {
    behaviors: HashMap<AnnotationKind, Box<dyn MarkerBehavior>>,
    markers: HashMap<AnnotationId, Marker>,
    next_id: u64,
    config: HighlightConfig,
}

impl std::fmt::Debug for MarkerLifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerLifecycleCoordinator")
            .field("markers", &self.markers.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl Default for MarkerLifecycleCoordinator {
    fn default() -> Self {
        Self::new(HighlightConfig::default())
    }
}

impl MarkerLifecycleCoordinator {
    /// Coordinator with the built-in text, image and table behaviors
    pub fn new(config: HighlightConfig) -> Self {
        let mut coordinator = Self {
            behaviors: HashMap::new(),
            markers: HashMap::new(),
            next_id: 1,
            config,
        };
        coordinator.register_behavior(Box::new(HighlightMarker));
        coordinator.register_behavior(Box::new(ImageMarker));
        coordinator.register_behavior(Box::new(TableMarker));
        coordinator
    }

    /// Install a behavior, replacing the one for the same kind
    pub fn register_behavior(
        &mut self,
        behavior: Box<dyn MarkerBehavior>,
    ) -> Option<Box<dyn MarkerBehavior>> {
        self.behaviors.insert(behavior.kind(), behavior)
    }

    /// Create the marker for an annotation, or return the existing one
    ///
    /// The anchor is re-validated first. A tracked marker whose wrapper was
    /// replaced is re-attached in place and keeps its id.
    pub fn create_marker_for_annotation(
        &mut self,
        annotation: &Annotation,
        anchors: &AnchorManager,
        doc: &DocumentHost,
    ) -> Result<&Marker> {
        let node = anchors
            .locate(doc, annotation.id.as_str())
            .and_then(|wrapped| wrapped.primary_node())
            .ok_or_else(|| {
                AnchorError::MarkerCreationFailed(format!(
                    "anchor for {} is not live",
                    annotation.id
                ))
            })?;
        let behavior = self.behaviors.get(&annotation.kind).ok_or_else(|| {
            AnchorError::MarkerCreationFailed(format!("no marker behavior for {}", annotation.kind))
        })?;

        match self.markers.entry(annotation.id.clone()) {
            Entry::Occupied(entry) => {
                let marker = entry.into_mut();
                if marker.attached_to != node {
                    debug!("Reattaching marker {} to {}", marker.id, node);
                    marker.attached_to = node;
                }
                Ok(&*marker)
            }
            Entry::Vacant(entry) => {
                let id = MarkerId::new(self.next_id);
                self.next_id += 1;
                debug!("Created marker {} for {}", id, annotation.id);
                let marker = entry.insert(Marker {
                    id,
                    annotation_id: annotation.id.clone(),
                    kind: annotation.kind,
                    attached_to: node,
                    decoration: behavior.create_marker(annotation, &self.config),
                    active: false,
                });
                Ok(&*marker)
            }
        }
    }

    /// Destroy the marker of an annotation; anchors are not touched
    pub fn remove_marker_for_annotation(&mut self, id: &str) -> Option<Marker> {
        let marker = self.markers.remove(id)?;
        debug!("Removed marker {} for {}", marker.id, id);
        Some(marker)
    }

    /// Make the marker set match `authoritative`
    ///
    /// Markers without an authoritative annotation are removed, missing ones
    /// are created and moved ones re-attached. A second call with the same
    /// input performs no action.
    pub fn sync(
        &mut self,
        authoritative: &[&Annotation],
        anchors: &AnchorManager,
        doc: &DocumentHost,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let wanted: HashSet<&str> = authoritative.iter().map(|a| a.id.as_str()).collect();

        let orphaned: Vec<AnnotationId> = self
            .markers
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        for id in orphaned {
            self.markers.remove(&id);
            report.removed += 1;
        }

        for annotation in authoritative {
            let current = anchors
                .locate(doc, annotation.id.as_str())
                .and_then(|wrapped| wrapped.primary_node());
            let Some(node) = current else {
                if self.markers.remove(annotation.id.as_str()).is_some() {
                    report.removed += 1;
                }
                report.failed += 1;
                continue;
            };

            let existing = self.markers.get(annotation.id.as_str()).map(|m| m.attached_to);
            match existing {
                Some(attached) if attached == node => {}
                Some(_) => {
                    if self.create_marker_for_annotation(annotation, anchors, doc).is_ok() {
                        report.reattached += 1;
                    }
                }
                None => match self.create_marker_for_annotation(annotation, anchors, doc) {
                    Ok(_) => report.created += 1,
                    Err(_) => report.failed += 1,
                },
            }
        }

        if !report.is_noop() {
            debug!(
                "Marker sync: {} created, {} reattached, {} removed, {} failed",
                report.created, report.reattached, report.removed, report.failed
            );
        }
        report
    }

    /// Rebuild the decoration after a payload change
    pub fn redecorate(&mut self, annotation: &Annotation) -> bool {
        let Some(behavior) = self.behaviors.get(&annotation.kind) else {
            return false;
        };
        match self.markers.get_mut(annotation.id.as_str()) {
            Some(marker) => {
                let active = marker.active;
                marker.decoration = behavior.create_marker(annotation, &self.config);
                if active {
                    behavior.on_activate(marker);
                }
                true
            }
            None => false,
        }
    }

    pub fn activate(&mut self, id: &str) -> bool {
        self.dispatch(id, true)
    }

    pub fn deactivate(&mut self, id: &str) -> bool {
        self.dispatch(id, false)
    }

    fn dispatch(&mut self, id: &str, active: bool) -> bool {
        let Some(marker) = self.markers.get_mut(id) else {
            return false;
        };
        let Some(behavior) = self.behaviors.get(&marker.kind) else {
            return false;
        };
        if active {
            behavior.on_activate(marker);
        } else {
            behavior.on_deactivate(marker);
        }
        true
    }

    pub fn marker(&self, id: &str) -> Option<&Marker> {
        self.markers.get(id)
    }

    /// Annotation owning a marker
    pub fn annotation_for(&self, marker: MarkerId) -> Option<&AnnotationId> {
        self.markers
            .values()
            .find(|m| m.id == marker)
            .map(|m| &m.annotation_id)
    }

    /// Destroy every marker
    pub fn clear(&mut self) -> usize {
        let count = self.markers.len();
        self.markers.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{SelectionConstraints, TextSpan};
    use crate::annotations::AnnotationPayload;
    use crate::document::NodeId;

    struct Fixture {
        doc: DocumentHost,
        host: NodeId,
        anchors: AnchorManager,
    }

    impl Fixture {
        fn new() -> Self {
            let doc = DocumentHost::from_markup(
                "ch1.xhtml",
                r#"<p id="intro">We use <em>Deep Learning</em> models.</p>"#,
            )
            .unwrap();
            let host = doc.find_by_attribute("id", "intro").unwrap();
            Self {
                doc,
                host,
                anchors: AnchorManager::new(),
            }
        }

        fn annotate(&mut self, id: &str, start: usize, end: usize) -> Annotation {
            let payload = AnnotationPayload::text("Method");
            let anchor = self
                .anchors
                .create(
                    &self.doc,
                    TextSpan::new(self.host, start, end),
                    &SelectionConstraints::default(),
                )
                .unwrap();
            let id = AnnotationId::new(id);
            self.anchors.wrap(&mut self.doc, &anchor, &id, &payload).unwrap();
            Annotation::new(id, anchor, payload)
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let mut fx = Fixture::new();
        let annotation = fx.annotate("h1", 7, 20);
        let mut markers = MarkerLifecycleCoordinator::default();

        let first = markers
            .create_marker_for_annotation(&annotation, &fx.anchors, &fx.doc)
            .unwrap()
            .id;
        let second = markers
            .create_marker_for_annotation(&annotation, &fx.anchors, &fx.doc)
            .unwrap()
            .id;

        assert_eq!(first, second);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.annotation_for(first), Some(&annotation.id));
    }

    #[test]
    fn test_create_without_anchor_fails() {
        let fx = Fixture::new();
        let mut markers = MarkerLifecycleCoordinator::default();
        let orphan = Annotation::new(
            AnnotationId::new("ghost"),
            crate::anchor::Anchor {
                host: fx.host,
                start: 0,
                end: 2,
                text: "We".to_string(),
            },
            AnnotationPayload::text("x"),
        );

        let result = markers.create_marker_for_annotation(&orphan, &fx.anchors, &fx.doc);
        assert!(matches!(result, Err(AnchorError::MarkerCreationFailed(_))));
        assert!(markers.is_empty());
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut fx = Fixture::new();
        let a = fx.annotate("h1", 0, 2);
        let b = fx.annotate("h2", 7, 20);
        let mut markers = MarkerLifecycleCoordinator::default();

        let report = markers.sync(&[&a, &b], &fx.anchors, &fx.doc);
        assert_eq!(report.created, 2);

        let again = markers.sync(&[&a, &b], &fx.anchors, &fx.doc);
        assert!(again.is_noop());
        assert_eq!(again.failed, 0);

        let shrunk = markers.sync(&[&b], &fx.anchors, &fx.doc);
        assert_eq!(shrunk.removed, 1);
        assert!(markers.marker("h1").is_none());
        assert!(markers.marker("h2").is_some());
    }

    #[test]
    fn test_reattach_after_rewrap() {
        let mut fx = Fixture::new();
        let annotation = fx.annotate("h1", 7, 20);
        let mut markers = MarkerLifecycleCoordinator::default();
        let id = markers
            .create_marker_for_annotation(&annotation, &fx.anchors, &fx.doc)
            .unwrap()
            .id;

        fx.anchors.unwrap(&mut fx.doc, "h1").unwrap();
        let anchor = fx
            .anchors
            .create(&fx.doc, TextSpan::new(fx.host, 3, 11), &SelectionConstraints::default())
            .unwrap();
        fx.anchors
            .wrap(&mut fx.doc, &anchor, &annotation.id, &annotation.payload)
            .unwrap();

        let report = markers.sync(&[&annotation], &fx.anchors, &fx.doc);
        assert_eq!(report.reattached, 1);
        let marker = markers.marker("h1").unwrap();
        assert_eq!(marker.id, id);
        assert_eq!(
            Some(marker.attached_to),
            fx.anchors.locate(&fx.doc, "h1").unwrap().primary_node()
        );
    }

    #[test]
    fn test_activate_dispatches_to_behavior() {
        let mut fx = Fixture::new();
        let annotation = fx.annotate("h1", 7, 20);
        let mut markers = MarkerLifecycleCoordinator::default();
        markers
            .create_marker_for_annotation(&annotation, &fx.anchors, &fx.doc)
            .unwrap();

        assert!(markers.activate("h1"));
        assert!(markers.marker("h1").unwrap().active);
        assert!(markers.deactivate("h1"));
        assert!(!markers.marker("h1").unwrap().active);
        assert!(!markers.activate("missing"));
    }
}

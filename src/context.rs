//! Annotation context
//!
//! Owns one live document together with everything that tracks annotations
//! on it. Components never reach for ambient state; they are handed the
//! parts of the context they need.

use tracing::{debug, warn};

use crate::anchor::AnchorManager;
use crate::annotations::AnnotationRegistry;
use crate::config::Config;
use crate::document::DocumentHost;
use crate::events::{AnnotationEvent, EventBus, PublishReport};
use crate::markers::{FrameScheduler, MarkerLifecycleCoordinator};

pub struct AnnotationContext {
    pub(crate) config: Config,
    pub(crate) document: DocumentHost,
    pub(crate) bus: EventBus<AnnotationEvent>,
    pub(crate) registry: AnnotationRegistry,
    pub(crate) anchors: AnchorManager,
    pub(crate) markers: MarkerLifecycleCoordinator,
    pub(crate) scheduler: FrameScheduler,
}

impl std::fmt::Debug for AnnotationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationContext")
            .field("document", &self.document)
            .field("annotations", &self.registry.len())
            .field("markers", &self.markers.len())
            .finish()
    }
}

impl AnnotationContext {
    /// Create a context around a document
    pub fn new(config: Config, document: DocumentHost) -> Self {
        let markers = MarkerLifecycleCoordinator::new(config.highlight.clone());
        Self {
            config,
            document,
            bus: EventBus::new(),
            registry: AnnotationRegistry::new(),
            anchors: AnchorManager::new(),
            markers,
            scheduler: FrameScheduler::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> &DocumentHost {
        &self.document
    }

    /// Edit the document
    ///
    /// Markers whose anchors the edit destroyed are dropped before this
    /// returns. The annotations stay registered until the next frame sweeps
    /// them.
    pub fn edit_document<R>(&mut self, edit: impl FnOnce(&mut DocumentHost) -> R) -> R {
        let result = edit(&mut self.document);
        self.drop_dead_markers();
        result
    }

    fn drop_dead_markers(&mut self) -> usize {
        let mut dropped = 0;
        for id in self.anchors.stale_ids(&self.document) {
            self.scheduler.cancel(id.as_str());
            if self.markers.remove_marker_for_annotation(id.as_str()).is_some() {
                self.registry.link_marker(id.as_str(), None);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("Edit invalidated {} anchor(s), markers dropped", dropped);
        }
        dropped
    }

    pub fn registry(&self) -> &AnnotationRegistry {
        &self.registry
    }

    pub fn anchors(&self) -> &AnchorManager {
        &self.anchors
    }

    pub fn markers(&self) -> &MarkerLifecycleCoordinator {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut MarkerLifecycleCoordinator {
        &mut self.markers
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn bus_mut(&mut self) -> &mut EventBus<AnnotationEvent> {
        &mut self.bus
    }

    /// Export the document with wrapper decoration
    pub fn to_markup(&self) -> String {
        self.document.to_markup(&self.config.highlight)
    }

    pub(crate) fn publish(&mut self, event: AnnotationEvent) -> PublishReport {
        let report = self.bus.publish(event.name(), &event);
        if report.failed > 0 {
            debug!(
                "{} for {}: {} subscriber(s) failed",
                event.name(),
                event.id(),
                report.failed
            );
        }
        report
    }

    /// Unwrap every anchor, drop all tracking state and hand the document back
    pub fn teardown(mut self) -> DocumentHost {
        for id in self.anchors.ids() {
            if let Err(e) = self.anchors.unwrap(&mut self.document, id.as_str()) {
                warn!("Teardown could not unwrap {}: {}", id, e);
            }
        }
        self.scheduler.clear();
        self.markers.clear();
        self.registry.clear_all();
        self.bus.clear_all();
        self.document
    }
}

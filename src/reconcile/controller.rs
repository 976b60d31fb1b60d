//! Reconciliation controller
//!
//! Composes the registry, anchors, markers and bus into user-visible
//! operations. Every operation leaves the three registry indices, the
//! tracked anchors and the markers agreeing with each other and with the
//! document, rolling back partial work where a step fails.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use super::state::{AnnotationState, CreateRequest, DeleteReport, FrameReport, UpdateRequest};
use crate::anchor::{Anchor, TextSpan};
use crate::annotations::{Annotation, AnnotationId, AnnotationPatch, AnnotationPayload};
use crate::context::AnnotationContext;
use crate::error::{AnchorError, Result};
use crate::events::AnnotationEvent;
use crate::markers::SyncReport;

/// Per-annotation state machine over an [`AnnotationContext`]
#[derive(Debug, Default)]
pub struct ReconciliationController {
    states: HashMap<AnnotationId, AnnotationState>,
}

impl ReconciliationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of a registered annotation
    pub fn state(&self, ctx: &AnnotationContext, id: &str) -> Option<AnnotationState> {
        if !ctx.registry.contains(id) {
            return None;
        }
        Some(self.states.get(id).copied().unwrap_or(AnnotationState::Active))
    }

    fn ensure_active(&self, id: &str) -> Result<()> {
        match self.states.get(id) {
            Some(state) if *state != AnnotationState::Active => Err(AnchorError::Busy {
                id: id.to_string(),
                state: *state,
            }),
            _ => Ok(()),
        }
    }

    fn check_consistency(ctx: &AnnotationContext) {
        debug_assert!(
            ctx.registry.check_consistency().is_ok(),
            "registry indices diverged: {:?}",
            ctx.registry.check_consistency()
        );
    }

    fn notify_error(ctx: &mut AnnotationContext, id: &str, operation: &str, message: String) {
        ctx.publish(AnnotationEvent::error(AnnotationId::from(id), operation, message));
    }

    // ============================================
    // Create
    // ============================================

    /// Validate, wrap, register, attach a marker and announce
    pub fn create(
        &mut self,
        ctx: &mut AnnotationContext,
        request: CreateRequest,
    ) -> Result<AnnotationId> {
        let id = request.id.unwrap_or_else(AnnotationId::generate);
        self.ensure_active(id.as_str())?;
        if ctx.registry.contains(id.as_str()) {
            return Err(AnchorError::RegistryConflict(id.to_string()));
        }

        let constraints = request.constraints.unwrap_or(ctx.config.selection);
        let anchor = match &request.text {
            Some(text) => ctx
                .anchors
                .create_expecting(&ctx.document, request.span, text, &constraints)?,
            None => ctx.anchors.create(&ctx.document, request.span, &constraints)?,
        };
        ctx.anchors
            .wrap(&mut ctx.document, &anchor, &id, &request.payload)?;

        let annotation = Annotation::new(id.clone(), anchor.clone(), request.payload.clone());
        if let Err(e) = ctx.registry.register_new(annotation) {
            if let Err(unwrap_error) = ctx.anchors.unwrap(&mut ctx.document, id.as_str()) {
                error!("Could not undo wrap of {}: {}", id, unwrap_error);
            }
            return Err(e);
        }
        self.states.insert(id.clone(), AnnotationState::Active);

        self.attach_marker(ctx, &id);
        let source = ctx.document.source().to_string();
        ctx.publish(AnnotationEvent::created(
            id.clone(),
            anchor.text,
            request.payload,
            source,
        ));

        debug!("Created annotation {}", id);
        Self::check_consistency(ctx);
        Ok(id)
    }

    /// Create the marker now, or queue it for the next frame
    fn attach_marker(&self, ctx: &mut AnnotationContext, id: &AnnotationId) {
        if ctx.config.markers.defer_creation {
            ctx.scheduler.schedule_marker(id.clone());
            return;
        }
        Self::link_marker(ctx, id);
    }

    fn link_marker(ctx: &mut AnnotationContext, id: &AnnotationId) -> bool {
        let Some(annotation) = ctx.registry.get(id.as_str()) else {
            return false;
        };
        match ctx
            .markers
            .create_marker_for_annotation(annotation, &ctx.anchors, &ctx.document)
        {
            Ok(marker) => {
                let marker_id = marker.id;
                ctx.registry.link_marker(id.as_str(), Some(marker_id));
                true
            }
            Err(e) => {
                warn!("No marker for {}: {}", id, e);
                false
            }
        }
    }

    // ============================================
    // Update
    // ============================================

    /// Move and/or restyle an annotation, keeping its id
    ///
    /// A failure after the old anchor was unwrapped re-wraps the original
    /// range before the error is returned.
    pub fn update(&mut self, ctx: &mut AnnotationContext, request: UpdateRequest) -> Result<()> {
        let id = request.id;
        let current = ctx
            .registry
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| AnchorError::AnchorNotFound(id.to_string()))?;
        self.ensure_active(id.as_str())?;

        if let Some(payload) = &request.payload {
            if payload.kind() != current.kind {
                return Err(AnchorError::RegistryConflict(format!(
                    "{} is a {} annotation, not {}",
                    id,
                    current.kind,
                    payload.kind()
                )));
            }
        }
        let payload = request.payload.unwrap_or_else(|| current.payload.clone());

        let anchor = match request.span {
            None => {
                ctx.anchors.restyle(&mut ctx.document, id.as_str(), &payload);
                ctx.registry
                    .update(id.as_str(), AnnotationPatch::payload(payload.clone()));
                current.anchor.clone()
            }
            Some(span) => {
                self.states.insert(id.clone(), AnnotationState::PendingUpdate);
                let swapped = Self::swap_anchor(ctx, &current, span, &payload);
                if ctx.registry.contains(id.as_str()) {
                    self.states.insert(id.clone(), AnnotationState::Active);
                } else {
                    self.states.remove(id.as_str());
                }
                let anchor = swapped?;
                ctx.registry.update(
                    id.as_str(),
                    AnnotationPatch {
                        anchor: Some(anchor.clone()),
                        payload: Some(payload.clone()),
                    },
                );
                // the old wrapper is gone; an existing marker follows now
                if ctx.markers.marker(id.as_str()).is_some() {
                    Self::link_marker(ctx, &id);
                } else {
                    self.attach_marker(ctx, &id);
                }
                anchor
            }
        };

        if let Some(annotation) = ctx.registry.get(id.as_str()) {
            ctx.markers.redecorate(annotation);
        }
        let text = ctx
            .anchors
            .locate(&ctx.document, id.as_str())
            .and_then(|wrapped| wrapped.text(&ctx.document))
            .unwrap_or(anchor.text);
        ctx.publish(AnnotationEvent::updated(id.clone(), text, payload));

        debug!("Updated annotation {}", id);
        Self::check_consistency(ctx);
        Ok(())
    }

    fn swap_anchor(
        ctx: &mut AnnotationContext,
        current: &Annotation,
        span: TextSpan,
        payload: &AnnotationPayload,
    ) -> Result<Anchor> {
        let id = &current.id;
        let constraints = ctx.config.selection;
        let candidate = ctx
            .anchors
            .resize(&ctx.document, id.as_str(), span, &constraints)?;
        let original = ctx
            .anchors
            .locate(&ctx.document, id.as_str())
            .and_then(|wrapped| wrapped.to_anchor(&ctx.document))
            .ok_or_else(|| AnchorError::AnchorNotFound(id.to_string()))?;

        Self::commit_swap(ctx, current, &original, candidate, payload)
    }

    /// Replace the wrappers of `current` with `candidate`
    ///
    /// When the new wrap fails the original range is wrapped again. If that
    /// fails too the annotation is dropped entirely so no index keeps an
    /// annotation without an anchor.
    fn commit_swap(
        ctx: &mut AnnotationContext,
        current: &Annotation,
        original: &Anchor,
        candidate: Anchor,
        payload: &AnnotationPayload,
    ) -> Result<Anchor> {
        let id = &current.id;
        ctx.anchors.unwrap(&mut ctx.document, id.as_str())?;

        let error = match ctx.anchors.wrap(&mut ctx.document, &candidate, id, payload) {
            Ok(_) => return Ok(candidate),
            Err(e) => e,
        };
        warn!("Update of {} failed, restoring original anchor: {}", id, error);

        match ctx
            .anchors
            .wrap(&mut ctx.document, original, id, &current.payload)
        {
            Ok(_) => {
                if ctx.markers.marker(id.as_str()).is_some() {
                    Self::link_marker(ctx, id);
                }
            }
            Err(restore) => {
                error!("Could not restore anchor of {}: {}", id, restore);
                Self::notify_error(ctx, id.as_str(), "update", restore.to_string());
                Self::discard(ctx, id.as_str());
            }
        }
        Err(error)
    }

    /// Drop every trace of an annotation that has lost its anchor
    fn discard(ctx: &mut AnnotationContext, id: &str) {
        ctx.scheduler.cancel(id);
        ctx.anchors.forget(id);
        ctx.markers.remove_marker_for_annotation(id);
        if ctx.registry.unregister(id).is_some() {
            ctx.publish(AnnotationEvent::removed(AnnotationId::from(id)));
        }
    }

    // ============================================
    // Delete
    // ============================================

    /// Unwrap, drop the marker, unregister and announce
    ///
    /// An unwrap failure does not stop the cleanup; it is logged, published
    /// as `annotation:error` and carried in the report.
    pub fn delete(&mut self, ctx: &mut AnnotationContext, id: &str) -> Result<DeleteReport> {
        if !ctx.registry.contains(id) && !ctx.anchors.is_tracked(id) {
            return Err(AnchorError::AnchorNotFound(id.to_string()));
        }
        self.ensure_active(id)?;
        self.states
            .insert(AnnotationId::from(id), AnnotationState::PendingDelete);

        ctx.scheduler.cancel(id);
        let (content, unwrap_error) = match ctx.anchors.unwrap(&mut ctx.document, id) {
            Ok(content) => (Some(content), None),
            Err(e) => {
                warn!("Deleting {} without a live anchor: {}", id, e);
                (None, Some(e.to_string()))
            }
        };
        if let Some(message) = &unwrap_error {
            Self::notify_error(ctx, id, "delete", message.clone());
        }

        let marker_removed = ctx.markers.remove_marker_for_annotation(id).is_some();
        let unregistered = ctx.registry.unregister(id).is_some();
        self.states.remove(id);
        ctx.publish(AnnotationEvent::removed(AnnotationId::from(id)));

        debug!("Deleted annotation {}", id);
        Self::check_consistency(ctx);
        Ok(DeleteReport {
            id: AnnotationId::from(id),
            unwrap_error,
            content,
            marker_removed,
            unregistered,
        })
    }

    // ============================================
    // Frames
    // ============================================

    /// Sweep dead anchors, then run deferred marker tasks
    pub fn run_frame(&mut self, ctx: &mut AnnotationContext) -> FrameReport {
        let mut report = FrameReport::default();

        for id in ctx.anchors.stale_ids(&ctx.document) {
            match self.delete(ctx, id.as_str()) {
                Ok(_) => report.swept.push(id),
                Err(e) => warn!("Could not sweep {}: {}", id, e),
            }
        }

        for id in ctx.scheduler.advance() {
            if Self::link_marker(ctx, &id) {
                report.markers_created += 1;
            } else {
                report.skipped += 1;
            }
        }

        report.frame = ctx.scheduler.frame();
        if !report.swept.is_empty() || report.markers_created > 0 {
            debug!(
                "Frame {}: swept {}, {} marker(s) created",
                report.frame,
                report.swept.len(),
                report.markers_created
            );
        }
        report
    }

    /// Bring the marker set in line with the registry
    pub fn reconcile_markers(&mut self, ctx: &mut AnnotationContext) -> SyncReport {
        let authoritative = ctx.registry.all();
        let report = ctx
            .markers
            .sync(&authoritative, &ctx.anchors, &ctx.document);

        let links: Vec<(AnnotationId, Option<_>)> = ctx
            .registry
            .ids()
            .into_iter()
            .map(|id| {
                let marker = ctx.markers.marker(id.as_str()).map(|m| m.id);
                (id, marker)
            })
            .collect();
        for (id, marker) in links {
            ctx.registry.link_marker(id.as_str(), marker);
        }
        report
    }
}

//! Anchor lifecycle
//!
//! Validates candidate spans, commits them to the document as wrapper
//! segments, and tracks the committed anchor per annotation id.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::selectors::AnnotationTarget;
use super::types::{Anchor, SelectionConstraints, TextSpan, WrappedAnchor};
use crate::annotations::{AnnotationId, AnnotationPayload};
use crate::document::{ContentNode, DocumentError, DocumentHost, WrapperMark};
use crate::error::{AnchorError, Result, SelectionRejection};

/// Tracks the wrapped anchor of every annotation
#[derive(Debug, Default)]
pub struct AnchorManager {
    wrapped: HashMap<AnnotationId, WrappedAnchor>,
}

fn host_error(span: &TextSpan, error: DocumentError) -> AnchorError {
    match error {
        DocumentError::NodeNotFound(_) | DocumentError::Detached(_) => {
            AnchorError::AnchorNotFound(format!("host {} is not in the document", span.host))
        }
        other => AnchorError::Document(other),
    }
}

impl AnchorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a span into a candidate anchor
    pub fn create(
        &self,
        doc: &DocumentHost,
        span: TextSpan,
        constraints: &SelectionConstraints,
    ) -> Result<Anchor> {
        self.candidate(doc, span, None, None, constraints)
    }

    /// Validate a span whose text the selection source also reported
    pub fn create_expecting(
        &self,
        doc: &DocumentHost,
        span: TextSpan,
        expected: &str,
        constraints: &SelectionConstraints,
    ) -> Result<Anchor> {
        self.candidate(doc, span, Some(expected), None, constraints)
    }

    /// Candidate anchor for moving an existing annotation
    ///
    /// The annotation's own wrappers do not count as overlap.
    pub fn resize(
        &self,
        doc: &DocumentHost,
        id: &str,
        span: TextSpan,
        constraints: &SelectionConstraints,
    ) -> Result<Anchor> {
        if !self.wrapped.contains_key(id) {
            return Err(AnchorError::AnchorNotFound(id.to_string()));
        }
        self.candidate(doc, span, None, Some(id), constraints)
    }

    fn candidate(
        &self,
        doc: &DocumentHost,
        span: TextSpan,
        expected: Option<&str>,
        ignore: Option<&str>,
        constraints: &SelectionConstraints,
    ) -> Result<Anchor> {
        doc.check_host(span.host).map_err(|e| host_error(&span, e))?;

        if span.start >= span.end {
            return Err(SelectionRejection::Collapsed.into());
        }
        let len = doc.content_len(span.host);
        if span.end > len {
            return Err(SelectionRejection::OutOfBounds { end: span.end, len }.into());
        }

        let text = doc.text_range(span.host, span.start, span.end)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SelectionRejection::Collapsed.into());
        }
        let count = trimmed.chars().count();
        if count < constraints.min_len {
            return Err(SelectionRejection::TooShort {
                len: count,
                min: constraints.min_len,
            }
            .into());
        }
        if count > constraints.max_len {
            return Err(SelectionRejection::TooLong {
                len: count,
                max: constraints.max_len,
            }
            .into());
        }

        if let Some(expected) = expected {
            if expected.trim() != trimmed {
                return Err(SelectionRejection::TextMismatch {
                    expected: expected.to_string(),
                    actual: text,
                }
                .into());
            }
        }

        if let Some(existing) = doc
            .overlapping_wrappers(span.host, span.start, span.end)
            .into_iter()
            .find(|existing| Some(existing.as_str()) != ignore)
        {
            return Err(SelectionRejection::Overlap {
                existing: existing.to_string(),
            }
            .into());
        }

        Ok(Anchor {
            host: span.host,
            start: span.start,
            end: span.end,
            text,
        })
    }

    /// Commit a candidate anchor as wrapper segments
    ///
    /// The anchor is re-validated against the current document before the
    /// single host mutation; on error the document is untouched.
    pub fn wrap(
        &mut self,
        doc: &mut DocumentHost,
        anchor: &Anchor,
        id: &AnnotationId,
        payload: &AnnotationPayload,
    ) -> Result<WrappedAnchor> {
        if let Some(existing) = self.wrapped.get(id) {
            if existing.is_live(doc) {
                return Err(AnchorError::RegistryConflict(id.to_string()));
            }
            debug!("Dropping stale anchor handle for {}", id);
            self.wrapped.remove(id);
        }

        let span = anchor.span();
        doc.check_host(anchor.host).map_err(|e| host_error(&span, e))?;
        let actual = doc.text_range(anchor.host, anchor.start, anchor.end)?;
        if actual != anchor.text {
            return Err(SelectionRejection::TextMismatch {
                expected: anchor.text.clone(),
                actual,
            }
            .into());
        }
        if let Some(existing) = doc
            .overlapping_wrappers(anchor.host, anchor.start, anchor.end)
            .into_iter()
            .next()
        {
            return Err(SelectionRejection::Overlap {
                existing: existing.to_string(),
            }
            .into());
        }

        let mark = WrapperMark {
            annotation_id: id.clone(),
            kind: payload.kind(),
            color: Some(payload.color().to_string()),
            label: Some(payload.label().to_string()),
        };
        let segments = doc.wrap_range(anchor.host, anchor.start, anchor.end, mark)?;
        debug!(
            "Wrapped {} at {}..{} in {} segment(s)",
            id,
            anchor.start,
            anchor.end,
            segments.len()
        );

        let wrapped = WrappedAnchor {
            id: id.clone(),
            host: anchor.host,
            segments,
        };
        self.wrapped.insert(id.clone(), wrapped.clone());
        Ok(wrapped)
    }

    /// Committed anchor, if it is still live
    pub fn locate(&self, doc: &DocumentHost, id: &str) -> Option<&WrappedAnchor> {
        self.wrapped.get(id).filter(|wrapped| wrapped.is_live(doc))
    }

    /// Whether a handle exists, live or not
    pub fn is_tracked(&self, id: &str) -> bool {
        self.wrapped.contains_key(id)
    }

    /// Remove the wrappers and return the content they covered
    ///
    /// The handle is dropped in every case. When the anchor is no longer
    /// live, surviving segments are still unwrapped and `AnchorNotFound` is
    /// returned.
    pub fn unwrap(&mut self, doc: &mut DocumentHost, id: &str) -> Result<Vec<ContentNode>> {
        let wrapped = self
            .wrapped
            .remove(id)
            .ok_or_else(|| AnchorError::AnchorNotFound(id.to_string()))?;

        let Some((start, end)) = wrapped.range(doc) else {
            for segment in &wrapped.segments {
                let owned = doc
                    .wrapper_mark(*segment)
                    .map_or(false, |mark| mark.annotation_id == wrapped.id);
                if owned {
                    if let Err(e) = doc.unwrap_wrapper(*segment) {
                        warn!("Failed to clean up segment {} of {}: {}", segment, id, e);
                    }
                }
            }
            return Err(AnchorError::AnchorNotFound(format!(
                "anchor for {} is no longer in the document",
                id
            )));
        };

        let content = doc.fragment(wrapped.host, start, end)?;
        for segment in wrapped.segments {
            doc.unwrap_wrapper(segment)?;
        }
        debug!("Unwrapped {}", id);
        Ok(content)
    }

    /// Rewrite the decoration of every segment for a new payload
    pub fn restyle(&self, doc: &mut DocumentHost, id: &str, payload: &AnnotationPayload) -> bool {
        let Some(wrapped) = self.locate(doc, id) else {
            return false;
        };
        let segments = wrapped.segments.clone();
        for segment in segments {
            if let Some(mark) = doc.wrapper_mark_mut(segment) {
                mark.color = Some(payload.color().to_string());
                mark.label = Some(payload.label().to_string());
            }
        }
        true
    }

    /// Drop a handle without touching the document
    pub fn forget(&mut self, id: &str) -> Option<WrappedAnchor> {
        self.wrapped.remove(id)
    }

    /// Tracked ids whose anchors are no longer live, sorted
    pub fn stale_ids(&self, doc: &DocumentHost) -> Vec<AnnotationId> {
        let mut ids: Vec<AnnotationId> = self
            .wrapped
            .values()
            .filter(|wrapped| !wrapped.is_live(doc))
            .map(|wrapped| wrapped.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Tracked ids, sorted
    pub fn ids(&self) -> Vec<AnnotationId> {
        let mut ids: Vec<AnnotationId> = self.wrapped.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// W3C selectors for a live anchor
    pub fn describe(&self, doc: &DocumentHost, id: &str) -> Option<AnnotationTarget> {
        let wrapped = self.locate(doc, id)?;
        let (start, end) = wrapped.range(doc)?;
        AnnotationTarget::describe(doc, wrapped.host, start, end).ok()
    }

    pub fn len(&self) -> usize {
        self.wrapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped.is_empty()
    }
}

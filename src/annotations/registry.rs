//! In-memory annotation registry
//!
//! Three indices over the same entries: by id (owning), by kind and by
//! anchor host. Secondary and tertiary indices are ordered by registration
//! sequence so lookups return annotations in insertion order.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{Annotation, AnnotationId, AnnotationKind, AnnotationPatch};
use crate::document::{DocumentHost, NodeId};
use crate::error::{AnchorError, Result};
use crate::markers::MarkerId;

struct Entry {
    annotation: Annotation,
    seq: u64,
}

/// Registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Annotations registered under a previously unseen id
    pub created: u64,
    /// Annotations unregistered
    pub deleted: u64,
    /// Annotations currently registered
    pub active: usize,
    #[serde(rename = "byType")]
    pub by_type: BTreeMap<AnnotationKind, usize>,
}

/// Multi-index store of live annotations
#[derive(Default)]
pub struct AnnotationRegistry {
    entries: HashMap<AnnotationId, Entry>,
    by_type: HashMap<AnnotationKind, BTreeMap<u64, AnnotationId>>,
    by_host: HashMap<NodeId, BTreeMap<u64, AnnotationId>>,
    next_seq: u64,
    created: u64,
    deleted: u64,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into all indices
    ///
    /// An existing id is overwritten after its old index membership is
    /// removed; the previous value is returned.
    pub fn register(&mut self, annotation: Annotation) -> Option<Annotation> {
        let id = annotation.id.clone();
        let (seq, previous) = match self.entries.remove(&id) {
            Some(old) => {
                warn!("Annotation {} registered twice, overwriting", id);
                self.unindex(&old.annotation, old.seq);
                (old.seq, Some(old.annotation))
            }
            None => {
                self.created += 1;
                let seq = self.next_seq;
                self.next_seq += 1;
                (seq, None)
            }
        };

        self.index(&annotation, seq);
        self.entries.insert(id, Entry { annotation, seq });
        previous
    }

    /// Insert a new annotation, failing if the id is taken
    pub fn register_new(&mut self, annotation: Annotation) -> Result<()> {
        if self.entries.contains_key(&annotation.id) {
            return Err(AnchorError::RegistryConflict(annotation.id.to_string()));
        }
        debug!("Registering annotation {} ({})", annotation.id, annotation.kind);
        self.register(annotation);
        Ok(())
    }

    /// Remove from all indices
    pub fn unregister(&mut self, id: &str) -> Option<Annotation> {
        let entry = self.entries.remove(id)?;
        self.unindex(&entry.annotation, entry.seq);
        self.deleted += 1;
        debug!("Unregistered annotation {}", id);
        Some(entry.annotation)
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.entries.get(id).map(|entry| &entry.annotation)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Annotations of one kind in registration order
    pub fn get_by_type(&self, kind: AnnotationKind) -> Vec<&Annotation> {
        self.collect(self.by_type.get(&kind))
    }

    /// Annotations anchored under `host` in registration order
    ///
    /// The host index is weak: a host that no longer resolves in `doc` has
    /// no annotations, even before the frame sweep unregisters them.
    pub fn get_by_anchor_host(&self, doc: &DocumentHost, host: NodeId) -> Vec<&Annotation> {
        if !doc.contains(host) {
            return Vec::new();
        }
        self.collect(self.by_host.get(&host))
    }

    fn collect(&self, ids: Option<&BTreeMap<u64, AnnotationId>>) -> Vec<&Annotation> {
        ids.map(|ids| ids.values().filter_map(|id| self.get(id.as_str())).collect())
            .unwrap_or_default()
    }

    /// Merge a patch into an annotation
    ///
    /// Returns false for unknown ids and for payloads of a different kind.
    pub fn update(&mut self, id: &str, patch: AnnotationPatch) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        if let Some(payload) = &patch.payload {
            if payload.kind() != entry.annotation.kind {
                warn!(
                    "Refusing to change annotation {} from {} to {}",
                    id,
                    entry.annotation.kind,
                    payload.kind()
                );
                return false;
            }
        }

        let seq = entry.seq;
        let old_host = entry.annotation.anchor.host;
        let annotation_id = entry.annotation.id.clone();

        if let Some(anchor) = &patch.anchor {
            if anchor.host != old_host {
                remove_from(&mut self.by_host, &old_host, seq);
                self.by_host
                    .entry(anchor.host)
                    .or_default()
                    .insert(seq, annotation_id);
            }
        }

        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        if let Some(anchor) = patch.anchor {
            entry.annotation.anchor = anchor;
        }
        if let Some(payload) = patch.payload {
            entry.annotation.payload = payload;
        }
        entry.annotation.updated_at = Utc::now();
        true
    }

    /// Record the marker bound to an annotation
    pub fn link_marker(&mut self, id: &str, marker: Option<MarkerId>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.annotation.marker_id = marker;
                true
            }
            None => false,
        }
    }

    /// Unregister every annotation of a kind
    pub fn clear_type(&mut self, kind: AnnotationKind) -> usize {
        let ids: Vec<AnnotationId> = self
            .by_type
            .get(&kind)
            .map(|ids| ids.values().cloned().collect())
            .unwrap_or_default();
        ids.iter()
            .filter(|id| self.unregister(id.as_str()).is_some())
            .count()
    }

    /// Unregister everything
    pub fn clear_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.by_type.clear();
        self.by_host.clear();
        self.deleted += count as u64;
        count
    }

    pub fn get_stats(&self) -> RegistryStats {
        let by_type = AnnotationKind::ALL
            .iter()
            .map(|kind| (*kind, self.by_type.get(kind).map_or(0, BTreeMap::len)))
            .collect();
        RegistryStats {
            created: self.created,
            deleted: self.deleted,
            active: self.entries.len(),
            by_type,
        }
    }

    /// Ids in registration order
    pub fn ids(&self) -> Vec<AnnotationId> {
        self.all().into_iter().map(|a| a.id.clone()).collect()
    }

    /// All annotations in registration order
    pub fn all(&self) -> Vec<&Annotation> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| &entry.annotation).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify that every index agrees with the primary index
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for (id, entry) in &self.entries {
            let annotation = &entry.annotation;
            if &annotation.id != id {
                return Err(format!("entry {} stores annotation {}", id, annotation.id));
            }
            if annotation.kind != annotation.payload.kind() {
                return Err(format!("{} has a {} payload", id, annotation.payload.kind()));
            }
            let typed = self
                .by_type
                .get(&annotation.kind)
                .and_then(|ids| ids.get(&entry.seq));
            if typed != Some(id) {
                return Err(format!("{} missing from the {} index", id, annotation.kind));
            }
            let hosted = self
                .by_host
                .get(&annotation.anchor.host)
                .and_then(|ids| ids.get(&entry.seq));
            if hosted != Some(id) {
                return Err(format!("{} missing from host {}", id, annotation.anchor.host));
            }
        }

        let typed: usize = self.by_type.values().map(BTreeMap::len).sum();
        let hosted: usize = self.by_host.values().map(BTreeMap::len).sum();
        if typed != self.entries.len() || hosted != self.entries.len() {
            return Err(format!(
                "index sizes differ: {} entries, {} typed, {} hosted",
                self.entries.len(),
                typed,
                hosted
            ));
        }
        Ok(())
    }

    fn index(&mut self, annotation: &Annotation, seq: u64) {
        self.by_type
            .entry(annotation.kind)
            .or_default()
            .insert(seq, annotation.id.clone());
        self.by_host
            .entry(annotation.anchor.host)
            .or_default()
            .insert(seq, annotation.id.clone());
    }

    fn unindex(&mut self, annotation: &Annotation, seq: u64) {
        remove_from(&mut self.by_type, &annotation.kind, seq);
        remove_from(&mut self.by_host, &annotation.anchor.host, seq);
    }
}

fn remove_from<K: std::hash::Hash + Eq>(
    index: &mut HashMap<K, BTreeMap<u64, AnnotationId>>,
    key: &K,
    seq: u64,
) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&seq);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::anchor::Anchor;
    use crate::annotations::AnnotationPayload;
    use crate::document::Element;

    fn hosts() -> (DocumentHost, NodeId, NodeId) {
        let mut doc = DocumentHost::new("test");
        let root = doc.root();
        let a = doc.append_element(root, Element::new("p")).unwrap();
        let b = doc.append_element(root, Element::new("p")).unwrap();
        (doc, a, b)
    }

    fn annotation(id: &str, host: NodeId, payload: AnnotationPayload) -> Annotation {
        let anchor = Anchor {
            host,
            start: 0,
            end: 4,
            text: "Deep".to_string(),
        };
        Annotation::new(AnnotationId::new(id), anchor, payload)
    }

    #[test]
    fn test_register_and_lookup() {
        let (doc, a, b) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));
        registry.register(annotation("h2", b, AnnotationPayload::image("Figure")));
        registry.register(annotation("h3", a, AnnotationPayload::text("Result")));

        assert_eq!(registry.len(), 3);
        let text: Vec<&str> = registry
            .get_by_type(AnnotationKind::Text)
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(text, vec!["h1", "h3"]);
        assert_eq!(registry.get_by_anchor_host(&doc, b).len(), 1);
        assert!(registry.check_consistency().is_ok());
    }

    #[test]
    fn test_register_overwrite_removes_stale_membership() {
        let (_doc, a, _) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));
        let previous = registry.register(annotation("h1", a, AnnotationPayload::table("Results")));

        assert!(previous.is_some());
        assert!(registry.get_by_type(AnnotationKind::Text).is_empty());
        assert_eq!(registry.get_by_type(AnnotationKind::Table).len(), 1);
        assert_eq!(registry.get_stats().created, 1);
        assert!(registry.check_consistency().is_ok());
    }

    #[test]
    fn test_register_new_conflict() {
        let (_doc, a, _) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry
            .register_new(annotation("h1", a, AnnotationPayload::text("Method")))
            .unwrap();
        let result = registry.register_new(annotation("h1", a, AnnotationPayload::text("Other")));

        assert!(matches!(result, Err(AnchorError::RegistryConflict(_))));
        assert_eq!(registry.get("h1").unwrap().payload.label(), "Method");
    }

    #[test]
    fn test_update_rehomes_host() {
        let (doc, a, b) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));

        let moved = Anchor {
            host: b,
            start: 1,
            end: 3,
            text: "ee".to_string(),
        };
        assert!(registry.update("h1", AnnotationPatch::anchor(moved)));
        assert!(registry.get_by_anchor_host(&doc, a).is_empty());
        assert_eq!(registry.get_by_anchor_host(&doc, b).len(), 1);
        assert!(registry.check_consistency().is_ok());
    }

    #[test]
    fn test_update_refuses_kind_change() {
        let (_doc, a, _) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));

        assert!(!registry.update("h1", AnnotationPatch::payload(AnnotationPayload::image("x"))));
        assert!(!registry.update("missing", AnnotationPatch::default()));
        assert_eq!(registry.get("h1").unwrap().kind, AnnotationKind::Text);
    }

    #[test]
    fn test_unregister_and_stats() {
        let (_doc, a, b) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));
        registry.register(annotation("h2", b, AnnotationPayload::table("Results")));
        registry.register(annotation("h3", b, AnnotationPayload::table("More")));

        assert!(registry.unregister("h1").is_some());
        assert!(registry.unregister("h1").is_none());
        assert_eq!(registry.clear_type(AnnotationKind::Table), 2);

        let stats = registry.get_stats();
        assert_eq!(stats.created, 3);
        assert_eq!(stats.deleted, 3);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.by_type[&AnnotationKind::Table], 0);
        assert!(registry.check_consistency().is_ok());
    }

    #[test]
    fn test_link_marker_keeps_updated_at() {
        let (_doc, a, _) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));
        let before = registry.get("h1").unwrap().updated_at;

        assert!(registry.link_marker("h1", Some(MarkerId::new(7))));
        let linked = registry.get("h1").unwrap();
        assert_eq!(linked.marker_id, Some(MarkerId::new(7)));
        assert_eq!(linked.updated_at, before);
    }

    #[test]
    fn test_host_index_is_weak() {
        let (mut doc, a, b) = hosts();
        let mut registry = AnnotationRegistry::new();
        registry.register(annotation("h1", a, AnnotationPayload::text("Method")));
        registry.register(annotation("h2", b, AnnotationPayload::text("Result")));

        doc.remove(a).unwrap();
        assert!(registry.get_by_anchor_host(&doc, a).is_empty());
        assert_eq!(registry.get_by_anchor_host(&doc, b).len(), 1);

        // a node built after the removal never inherits the dead host's entries
        let root = doc.root();
        let c = doc.append_element(root, Element::new("p")).unwrap();
        assert_ne!(c, a);
        assert!(registry.get_by_anchor_host(&doc, c).is_empty());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Register(usize, usize, usize),
        Unregister(usize),
        Move(usize, usize),
        Restyle(usize, usize),
        ClearType(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0..6usize, 0..2usize, 0..3usize).prop_map(|(i, h, k)| Step::Register(i, h, k)),
            (0..6usize).prop_map(Step::Unregister),
            (0..6usize, 0..2usize).prop_map(|(i, h)| Step::Move(i, h)),
            (0..6usize, 0..3usize).prop_map(|(i, k)| Step::Restyle(i, k)),
            (0..3usize).prop_map(Step::ClearType),
        ]
    }

    fn payload_of(kind: usize) -> AnnotationPayload {
        match kind {
            0 => AnnotationPayload::text("Method"),
            1 => AnnotationPayload::image("Figure"),
            _ => AnnotationPayload::table("Results"),
        }
    }

    proptest! {
        #[test]
        fn test_indices_agree_after_any_sequence(steps in prop::collection::vec(step(), 0..40)) {
            let (doc, a, b) = hosts();
            let hosts = [a, b];
            let mut registry = AnnotationRegistry::new();

            for step in steps {
                match step {
                    Step::Register(i, h, k) => {
                        registry.register(annotation(&format!("h{}", i), hosts[h], payload_of(k)));
                    }
                    Step::Unregister(i) => {
                        registry.unregister(&format!("h{}", i));
                    }
                    Step::Move(i, h) => {
                        let anchor = Anchor {
                            host: hosts[h],
                            start: 1,
                            end: 3,
                            text: "ee".to_string(),
                        };
                        registry.update(&format!("h{}", i), AnnotationPatch::anchor(anchor));
                    }
                    Step::Restyle(i, k) => {
                        let patch = AnnotationPatch::payload(payload_of(k));
                        registry.update(&format!("h{}", i), patch);
                    }
                    Step::ClearType(k) => {
                        registry.clear_type(AnnotationKind::ALL[k]);
                    }
                }
                let check = registry.check_consistency();
                prop_assert!(check.is_ok(), "{:?}", check);
            }

            let stats = registry.get_stats();
            prop_assert_eq!(stats.active, registry.len());
            prop_assert_eq!(stats.by_type.values().sum::<usize>(), registry.len());
            let hosted: usize = hosts
                .iter()
                .map(|host| registry.get_by_anchor_host(&doc, *host).len())
                .sum();
            prop_assert_eq!(hosted, registry.len());
        }
    }
}

//! Deferred marker creation
//!
//! Marker creation can be postponed to the next frame so a burst of edits
//! only pays for one decoration pass. Tasks are keyed by annotation id and
//! can be cancelled until the frame runs.

use std::collections::{BTreeMap, HashMap};

use crate::annotations::AnnotationId;

/// Cancelable-by-id queue of marker tasks for the next frame
#[derive(Debug, Default)]
pub struct FrameScheduler {
    frame: u64,
    queue: BTreeMap<u64, AnnotationId>,
    pending: HashMap<AnnotationId, u64>,
    next_seq: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue marker creation; false if already queued
    pub fn schedule_marker(&mut self, id: AnnotationId) -> bool {
        if self.pending.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert(seq, id.clone());
        self.pending.insert(id, seq);
        true
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some(seq) => {
                self.queue.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Start the next frame and take its tasks in scheduling order
    pub fn advance(&mut self) -> Vec<AnnotationId> {
        self.frame += 1;
        self.pending.clear();
        std::mem::take(&mut self.queue).into_values().collect()
    }

    /// Frames started so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        self.pending.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_cancel_advance() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.schedule_marker(AnnotationId::new("h1")));
        assert!(!scheduler.schedule_marker(AnnotationId::new("h1")));
        assert!(scheduler.schedule_marker(AnnotationId::new("h2")));
        assert!(scheduler.schedule_marker(AnnotationId::new("h3")));

        assert!(scheduler.cancel("h2"));
        assert!(!scheduler.cancel("h2"));
        assert!(scheduler.is_pending("h1"));

        let due = scheduler.advance();
        assert_eq!(due, vec![AnnotationId::new("h1"), AnnotationId::new("h3")]);
        assert_eq!(scheduler.frame(), 1);
        assert!(scheduler.is_empty());
        assert!(!scheduler.is_pending("h1"));
    }
}

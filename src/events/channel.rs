//! Messaging channel adapter
//!
//! Forwards every bus event as a JSON message into a tokio channel, so an
//! async consumer (a websocket writer, a log sink) can observe the
//! annotation lifecycle without touching the single-threaded core.

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::bus::{EventBus, SubscriptionId};
use super::types::AnnotationEvent;

/// Message sent over the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMessage {
    pub event: String,
    pub data: serde_json::Value,
}

/// Wildcard subscription feeding a channel
#[derive(Debug)]
pub struct ChannelForwarder {
    subscription: SubscriptionId,
}

impl ChannelForwarder {
    /// Forward into an existing sender
    pub fn attach(
        bus: &mut EventBus<AnnotationEvent>,
        sender: UnboundedSender<ChannelMessage>,
    ) -> Self {
        let subscription = bus.subscribe_all(move |event, payload| {
            let data = serde_json::to_value(payload)?;
            sender
                .send(ChannelMessage {
                    event: event.to_string(),
                    data,
                })
                .map_err(|_| anyhow!("messaging channel closed"))
        });
        Self { subscription }
    }

    /// Forward into a new unbounded channel
    pub fn channel(
        bus: &mut EventBus<AnnotationEvent>,
    ) -> (Self, UnboundedReceiver<ChannelMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::attach(bus, sender), receiver)
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Stop forwarding
    pub fn detach(self, bus: &mut EventBus<AnnotationEvent>) -> bool {
        bus.unsubscribe(self.subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationId, AnnotationPayload};
    use crate::events::{ANNOTATION_CREATED, ANNOTATION_REMOVED};

    #[tokio::test]
    async fn test_forwards_events_in_order() {
        let mut bus = EventBus::new();
        let (_forwarder, mut receiver) = ChannelForwarder::channel(&mut bus);

        let created = AnnotationEvent::created(
            AnnotationId::new("h1"),
            "Deep Learning".to_string(),
            AnnotationPayload::text("Method"),
            "ch1.xhtml",
        );
        bus.publish(created.name(), &created);
        let removed = AnnotationEvent::removed(AnnotationId::new("h1"));
        bus.publish(removed.name(), &removed);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event, ANNOTATION_CREATED);
        assert_eq!(first.data["payload"]["label"], "Method");

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.event, ANNOTATION_REMOVED);
        assert_eq!(second.data["id"], "h1");
    }

    #[tokio::test]
    async fn test_closed_channel_is_reported_not_raised() {
        let mut bus = EventBus::new();
        let (forwarder, receiver) = ChannelForwarder::channel(&mut bus);
        drop(receiver);

        let event = AnnotationEvent::removed(AnnotationId::new("h1"));
        let report = bus.publish(event.name(), &event);
        assert_eq!(report.failed, 1);

        assert!(forwarder.detach(&mut bus));
        assert_eq!(bus.listener_count(event.name()), 0);
    }
}

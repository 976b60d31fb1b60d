//! Annotation event bus and messaging channel

mod bus;
mod channel;
mod types;

pub use bus::{EventBus, PublishReport, SubscriptionId};
pub use channel::{ChannelForwarder, ChannelMessage};
pub use types::{
    AnnotationEvent, CreatedEvent, ErrorEvent, RemovedEvent, UpdatedEvent, ANNOTATION_CREATED,
    ANNOTATION_ERROR, ANNOTATION_REMOVED, ANNOTATION_UPDATED,
};

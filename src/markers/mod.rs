//! Markers
//!
//! Decorated widgets bound one-to-one to annotations, created lazily and
//! destroyed with their annotation or anchor.

mod coordinator;
mod kinds;
mod marker;
mod scheduler;

pub use coordinator::{MarkerLifecycleCoordinator, SyncReport};
pub use kinds::{HighlightMarker, ImageMarker, TableMarker};
pub use marker::{Marker, MarkerBehavior, MarkerDecoration, MarkerId};
pub use scheduler::FrameScheduler;

//! Reconciliation of annotations with the live document

mod controller;
mod state;

pub use controller::ReconciliationController;
pub use state::{AnnotationState, CreateRequest, DeleteReport, FrameReport, UpdateRequest};

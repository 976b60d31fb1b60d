//! Los Libros Anchors
//!
//! Annotation registry and anchor reconciliation for live chapter documents.
//!
//! # Modules
//!
//! - `document`: Arena document host with wrap/unwrap primitives
//! - `anchor`: Selection validation and wrapped anchor tracking
//! - `annotations`: Annotation model and the indexed registry
//! - `markers`: Marker behaviors, lifecycle coordinator and frame scheduler
//! - `events`: Event bus and the messaging channel adapter
//! - `reconcile`: Create/update/delete orchestration
//! - `html`: Markup import/export, sanitization and highlight styling
//! - `ops`: JSON operation scripts

pub mod anchor;
pub mod annotations;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod html;
pub mod markers;
pub mod ops;
pub mod reconcile;

pub use config::Config;
pub use context::AnnotationContext;
pub use document::DocumentHost;
pub use error::{AnchorError, Result};
pub use reconcile::ReconciliationController;

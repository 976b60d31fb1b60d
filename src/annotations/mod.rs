//! Annotation model and registry

mod registry;
mod types;

pub use registry::{AnnotationRegistry, RegistryStats};
pub use types::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationPayload, ImagePayload,
    LabelSource, TablePayload, TextPayload, DEFAULT_COLOR,
};

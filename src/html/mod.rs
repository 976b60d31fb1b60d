//! HTML processing
//!
//! Markup import/export for the document host, wrapper decoration and
//! sanitizing of untrusted chapter content.

mod highlight;
mod markup;
mod sanitize;

pub use highlight::{HighlightConfig, DEFAULT_OPACITY};
pub use markup::parse_markup;
pub use sanitize::sanitize_html;

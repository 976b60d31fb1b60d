//! Wrapper decoration
//!
//! Attributes written for annotation wrapper segments when a document is
//! exported, and the class names marker decorations share with them.

use crate::annotations::AnnotationKind;
use crate::document::WrapperMark;

/// Highlight opacity used in inline styles
pub const DEFAULT_OPACITY: f32 = 0.3;

/// Configuration for wrapper decoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightConfig {
    /// CSS class prefix for highlights
    pub class_prefix: String,
    /// Data attribute for annotation ID
    pub id_attribute: String,
    /// Data attribute for annotation type
    pub type_attribute: String,
    /// Whether to include inline styles
    pub include_inline_styles: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            class_prefix: "ll-highlight".to_string(),
            id_attribute: "data-annotation-id".to_string(),
            type_attribute: "data-annotation-type".to_string(),
            include_inline_styles: true,
        }
    }
}

impl HighlightConfig {
    /// `"{prefix} {prefix}-{kind}"`
    pub fn class_for(&self, kind: AnnotationKind) -> String {
        format!("{} {}-{}", self.class_prefix, self.class_prefix, kind)
    }

    /// Inline style for a decoration color
    pub fn style_for(&self, color: &str) -> Option<String> {
        self.include_inline_styles
            .then(|| format!("background-color: {}; opacity: {};", color, DEFAULT_OPACITY))
    }

    /// Attributes of an exported wrapper segment, in output order
    pub fn wrapper_attributes(&self, mark: &WrapperMark) -> Vec<(String, String)> {
        let mut attributes = vec![
            ("class".to_string(), self.class_for(mark.kind)),
            (self.id_attribute.clone(), mark.annotation_id.to_string()),
            (self.type_attribute.clone(), mark.kind.to_string()),
        ];
        if let Some(label) = &mark.label {
            attributes.push(("title".to_string(), label.clone()));
        }
        if let Some(style) = mark.color.as_deref().and_then(|color| self.style_for(color)) {
            attributes.push(("style".to_string(), style));
        }
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::AnnotationId;

    fn mark() -> WrapperMark {
        WrapperMark {
            annotation_id: AnnotationId::new("h1"),
            kind: AnnotationKind::Text,
            color: Some("#ffff00".to_string()),
            label: Some("Method".to_string()),
        }
    }

    #[test]
    fn test_wrapper_attributes() {
        let attributes = HighlightConfig::default().wrapper_attributes(&mark());

        assert_eq!(attributes[0].1, "ll-highlight ll-highlight-text");
        assert_eq!(attributes[1], ("data-annotation-id".to_string(), "h1".to_string()));
        assert_eq!(attributes[2].1, "text");
        assert_eq!(attributes[3].1, "Method");
        assert_eq!(attributes[4].1, "background-color: #ffff00; opacity: 0.3;");
    }

    #[test]
    fn test_no_inline_styles() {
        let config = HighlightConfig {
            include_inline_styles: false,
            ..HighlightConfig::default()
        };
        let attributes = config.wrapper_attributes(&mark());

        assert!(attributes.iter().all(|(name, _)| name != "style"));
    }
}

//! W3C Web Annotation selectors
//!
//! Anchors are exported as a text position plus a text quote with context,
//! so they can be re-anchored after the host content has shifted.
//!
//! Reference: <https://www.w3.org/TR/annotation-model/#selectors>

use serde::{Deserialize, Serialize};

use super::types::TextSpan;
use crate::document::{DocumentHost, NodeId, Result};

/// Context captured on each side of a quote, in content units
pub const CONTEXT_LEN: usize = 32;

/// Selector types for identifying a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    /// Text quote with context
    #[serde(rename = "TextQuoteSelector")]
    TextQuote {
        /// The exact annotated text
        exact: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
    /// Offsets within the host
    #[serde(rename = "TextPositionSelector")]
    TextPosition { start: usize, end: usize },
}

/// The target of an annotation (what is being annotated)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationTarget {
    /// Source document
    pub source: String,
    /// Multiple selectors for robust anchoring
    pub selectors: Vec<Selector>,
}

impl AnnotationTarget {
    /// Describe `start..end` of `host`
    pub fn describe(doc: &DocumentHost, host: NodeId, start: usize, end: usize) -> Result<Self> {
        let exact = doc.text_range(host, start, end)?;
        let text: Vec<char> = doc.text_content(host).chars().collect();
        let prefix: String = text[start.saturating_sub(CONTEXT_LEN)..start].iter().collect();
        let suffix: String = text[end..(end + CONTEXT_LEN).min(text.len())].iter().collect();

        Ok(Self {
            source: doc.source().to_string(),
            selectors: vec![
                Selector::TextPosition { start, end },
                Selector::TextQuote {
                    exact,
                    prefix: (!prefix.is_empty()).then_some(prefix),
                    suffix: (!suffix.is_empty()).then_some(suffix),
                },
            ],
        })
    }

    pub fn text_quote(&self) -> Option<(&str, Option<&str>, Option<&str>)> {
        self.selectors.iter().find_map(|selector| match selector {
            Selector::TextQuote {
                exact,
                prefix,
                suffix,
            } => Some((exact.as_str(), prefix.as_deref(), suffix.as_deref())),
            _ => None,
        })
    }

    pub fn text_position(&self) -> Option<(usize, usize)> {
        self.selectors.iter().find_map(|selector| match selector {
            Selector::TextPosition { start, end } => Some((*start, *end)),
            _ => None,
        })
    }

    /// Re-anchor inside `host`
    ///
    /// The position selector wins while it still covers the quoted text;
    /// otherwise the quote is searched for.
    pub fn resolve(&self, doc: &DocumentHost, host: NodeId) -> Option<TextSpan> {
        let quote = self.text_quote();
        if let Some((start, end)) = self.text_position() {
            let current = doc.text_range(host, start, end).ok();
            match (quote, current) {
                (Some((exact, _, _)), Some(current)) if current == exact => {
                    return Some(TextSpan::new(host, start, end))
                }
                (None, Some(_)) => return Some(TextSpan::new(host, start, end)),
                _ => {}
            }
        }
        let (exact, prefix, suffix) = quote?;
        resolve_text_quote(doc, host, exact, prefix, suffix)
    }
}

/// Find `exact` inside `host`, using context to pick between repeats
pub fn resolve_text_quote(
    doc: &DocumentHost,
    host: NodeId,
    exact: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> Option<TextSpan> {
    doc.check_host(host).ok()?;
    let text: Vec<char> = doc.text_content(host).chars().collect();
    let needle: Vec<char> = exact.chars().collect();
    if needle.is_empty() || needle.len() > text.len() {
        return None;
    }

    let prefix: Vec<char> = prefix.unwrap_or_default().chars().collect();
    let suffix: Vec<char> = suffix.unwrap_or_default().chars().collect();

    let mut best: Option<(usize, usize)> = None;
    for start in 0..=text.len() - needle.len() {
        if text[start..start + needle.len()] != needle[..] {
            continue;
        }
        let end = start + needle.len();
        let before = text[..start]
            .iter()
            .rev()
            .zip(prefix.iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        let after = text[end..]
            .iter()
            .zip(suffix.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let score = before + after;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((start, score));
        }
    }

    best.map(|(start, _)| TextSpan::new(host, start, start + needle.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> (DocumentHost, NodeId) {
        let doc = DocumentHost::from_markup(
            "ch1.xhtml",
            r#"<p id="p">The model is small. The model is large.</p>"#,
        )
        .unwrap();
        let host = doc.find_by_attribute("id", "p").unwrap();
        (doc, host)
    }

    #[test]
    fn test_describe() {
        let (doc, host) = doc();
        let target = AnnotationTarget::describe(&doc, host, 4, 9).unwrap();

        assert_eq!(target.source, "ch1.xhtml");
        assert_eq!(target.text_position(), Some((4, 9)));
        assert_eq!(
            target.text_quote(),
            Some(("model", Some("The "), Some(" is small. The model is large.")))
        );
    }

    #[test]
    fn test_selector_json_shape() {
        let (doc, host) = doc();
        let target = AnnotationTarget::describe(&doc, host, 0, 3).unwrap();
        let json = serde_json::to_value(&target).unwrap();

        assert_eq!(json["selectors"][0]["type"], "TextPositionSelector");
        assert_eq!(json["selectors"][1]["type"], "TextQuoteSelector");
        assert!(json["selectors"][1].get("prefix").is_none());
    }

    #[test]
    fn test_resolve_quote_uses_context() {
        let (doc, host) = doc();
        let first = resolve_text_quote(&doc, host, "model", None, Some(" is small")).unwrap();
        let second = resolve_text_quote(&doc, host, "model", None, Some(" is large")).unwrap();

        assert_eq!((first.start, first.end), (4, 9));
        assert_eq!((second.start, second.end), (24, 29));
        assert!(resolve_text_quote(&doc, host, "missing", None, None).is_none());
    }

    #[test]
    fn test_resolve_after_shift() {
        let (mut doc, host) = doc();
        let target = AnnotationTarget::describe(&doc, host, 24, 29).unwrap();

        doc.insert_text(host, 0, "Note: ").unwrap();
        let span = target.resolve(&doc, host).unwrap();
        assert_eq!((span.start, span.end), (30, 35));
    }
}

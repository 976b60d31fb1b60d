//! Markup sanitizing using lol_html
//!
//! Chapter markup from untrusted sources is cleaned before it is loaded into
//! a [`DocumentHost`](crate::document::DocumentHost). Besides executable
//! content, annotation attributes are stripped so imported markup cannot
//! pose as wrappers of this engine.

use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::document::{DocumentError, Result};

const DROPPED_ELEMENTS: [&str; 5] = ["script", "style", "iframe", "object", "embed"];

const URL_ATTRIBUTES: [&str; 3] = ["href", "src", "xlink:href"];

const ANNOTATION_ATTRIBUTE_PREFIX: &str = "data-annotation-";

fn is_script_url(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value.starts_with("javascript:") || value.starts_with("vbscript:")
}

fn strip_attributes(el: &mut Element) {
    let doomed: Vec<String> = el
        .attributes()
        .iter()
        .filter(|attr| {
            let name = attr.name();
            name.starts_with("on")
                || name.starts_with(ANNOTATION_ATTRIBUTE_PREFIX)
                || (URL_ATTRIBUTES.contains(&name.as_str()) && is_script_url(&attr.value()))
        })
        .map(|attr| attr.name())
        .collect();
    for name in doomed {
        el.remove_attribute(&name);
    }
}

/// Remove executable content, event handlers, script URLs and annotation
/// attributes
pub fn sanitize_html(html: &str) -> Result<String> {
    let mut handlers: Vec<_> = DROPPED_ELEMENTS
        .iter()
        .map(|tag| {
            element!(tag, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();
    handlers.push(element!("*", |el| {
        strip_attributes(el);
        Ok(())
    }));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| DocumentError::SanitizeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_drops_executable_elements() {
        let chapter = r#"<section><h2>Methods</h2><script>track("ch3")</script><style>p { color: red }</style><p id="intro">We use Deep Learning.</p><iframe src="ad.html"></iframe></section>"#;
        let result = sanitize_html(chapter).unwrap();

        assert!(!result.contains("track"));
        assert!(!result.contains("color: red"));
        assert!(!result.contains("iframe"));
        assert!(result.contains(r#"<p id="intro">We use Deep Learning.</p>"#));
    }

    #[test]
    fn test_sanitize_strips_handlers_and_script_urls() {
        let chapter = r#"<p id="intro" onmouseover="peek()">See <a href="  JavaScript:steal()">figure 2</a> and <img src="fig2.png" onerror="peek()"></p>"#;
        let result = sanitize_html(chapter).unwrap();

        assert!(!result.contains("peek"));
        assert!(!result.contains("steal"));
        assert!(result.contains(r#"id="intro""#));
        assert!(result.contains(r#"src="fig2.png""#));
        assert!(result.contains("figure 2"));
    }

    #[test]
    fn test_sanitize_strips_forged_annotation_attributes() {
        let chapter = r#"<p>We use <span class="ll-highlight" data-annotation-id="h9" data-annotation-type="text">Deep</span> models.</p>"#;
        let result = sanitize_html(chapter).unwrap();

        assert!(!result.contains("data-annotation"));
        assert!(result.contains(r#"<span class="ll-highlight">Deep</span>"#));
    }

    #[test]
    fn test_is_script_url() {
        assert!(is_script_url(" javascript:void(0)"));
        assert!(is_script_url("VBScript:msgbox"));
        assert!(!is_script_url("chapter4.xhtml#fig2"));
    }
}

//! Chapter markup import/export
//!
//! Parsing is tolerant of HTML habits found in EPUB content: void elements
//! without a closing tag, stray end tags and named character entities
//! beyond the five XML ones.

use std::fmt::Write as _;
use std::path::Path;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::highlight::HighlightConfig;
use super::sanitize::sanitize_html;
use crate::document::{DocumentError, DocumentHost, Element, NodeId, NodeKind, Result};

/// Named entities accepted in text content
fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        "nbsp" => Some("\u{a0}"),
        "shy" => Some("\u{ad}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "hellip" => Some("\u{2026}"),
        "copy" => Some("\u{a9}"),
        _ => None,
    }
}

fn parse_element(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.html_attributes() {
        let attr = attr.map_err(|e| DocumentError::ParseError(e.to_string()))?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        element.attributes.push((name, value));
    }
    Ok(element)
}

/// Build a document from XHTML/HTML markup
pub fn parse_markup(source: impl Into<String>, markup: &str) -> Result<DocumentHost> {
    let mut doc = DocumentHost::new(source);
    let mut stack: Vec<NodeId> = vec![doc.root()];

    let mut reader = Reader::from_str(markup);
    reader.check_end_names(false);

    loop {
        let current = stack.last().copied().unwrap_or_else(|| doc.root());
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let element = parse_element(&e)?;
                let void = element.is_void();
                let id = doc.append_element(current, element)?;
                if !void {
                    stack.push(id);
                }
            }
            Ok(Event::Empty(e)) => {
                let element = parse_element(&e)?.self_closing();
                doc.append_element(current, element)?;
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let open = stack.iter().rposition(|id| {
                    doc.kind(*id)
                        .and_then(NodeKind::as_element)
                        .map_or(false, |element| element.tag.eq_ignore_ascii_case(&name))
                });
                match open {
                    Some(index) => stack.truncate(index),
                    None => debug!("Ignoring stray end tag </{}>", name),
                }
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape_with(resolve_entity) {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                if !text.is_empty() {
                    doc.append_text(current, &text)?;
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                doc.append_text(current, &text)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DocumentError::ParseError(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(doc)
}

impl DocumentHost {
    /// Parse trusted markup
    pub fn from_markup(source: impl Into<String>, markup: &str) -> Result<Self> {
        parse_markup(source, markup)
    }

    /// Sanitize then parse markup
    pub fn from_untrusted_markup(source: impl Into<String>, markup: &str) -> Result<Self> {
        let clean = sanitize_html(markup)?;
        parse_markup(source, &clean)
    }

    /// Load a chapter file; the file name becomes the document source
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let markup = std::fs::read_to_string(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_untrusted_markup(source, &markup)
    }

    /// Serialize the document, writing wrapper segments as decorated elements
    pub fn to_markup(&self, config: &HighlightConfig) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            write_node(self, *child, config, &mut out);
        }
        out
    }
}

fn write_open(out: &mut String, tag: &str, attributes: &[(String, String)]) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attributes {
        let _ = write!(out, " {}=\"{}\"", name, escape(value.as_str()));
    }
}

fn write_node(doc: &DocumentHost, id: NodeId, config: &HighlightConfig, out: &mut String) {
    let Some(kind) = doc.kind(id) else {
        return;
    };
    match kind {
        NodeKind::Text(text) => out.push_str(&partial_escape(text.as_str())),
        NodeKind::Element(element) => {
            write_open(out, &element.tag, &element.attributes);
            let children = doc.children(id);
            if children.is_empty() && (element.self_closing || element.is_void()) {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                write_node(doc, *child, config, out);
            }
            let _ = write!(out, "</{}>", element.tag);
        }
        NodeKind::Wrapper(mark) => {
            let block = doc.children(id).iter().any(|child| {
                doc.kind(*child)
                    .and_then(NodeKind::as_element)
                    .map_or(false, Element::is_block)
            });
            let tag = if block { "div" } else { "span" };
            write_open(out, tag, &config.wrapper_attributes(mark));
            out.push('>');
            for child in doc.children(id) {
                write_node(doc, *child, config, out);
            }
            let _ = write!(out, "</{}>", tag);
        }
        NodeKind::Root => {
            for child in doc.children(id) {
                write_node(doc, *child, config, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::annotations::{AnnotationId, AnnotationKind};
    use crate::document::{WrapperMark, OBJECT_REPLACEMENT};

    const CHAPTER: &str = r#"<section><p id="intro">We use <em>Deep Learning</em> models.</p><p id="fig">See <img src="fig1.png"> below&nbsp;&amp; above.<br></p></section>"#;

    #[test]
    fn test_parse_structure() {
        let doc = parse_markup("ch1.xhtml", CHAPTER).unwrap();
        let intro = doc.find_by_attribute("id", "intro").unwrap();
        let fig = doc.find_by_attribute("id", "fig").unwrap();

        assert_eq!(doc.text_content(intro), "We use Deep Learning models.");
        assert_eq!(
            doc.text_content(fig),
            format!("See {} below\u{a0}& above.{}", OBJECT_REPLACEMENT, OBJECT_REPLACEMENT)
        );
    }

    #[test]
    fn test_round_trip_without_wrappers() {
        let markup = r#"<p id="intro">We use <em>Deep Learning</em> models.<br/></p>"#;
        let doc = parse_markup("ch1.xhtml", markup).unwrap();

        assert_eq!(doc.to_markup(&HighlightConfig::default()), markup);
    }

    #[test]
    fn test_export_wrapper_as_span() {
        let mut doc = parse_markup("ch1.xhtml", r#"<p id="intro">We use <em>Deep Learning</em> models.</p>"#).unwrap();
        let intro = doc.find_by_attribute("id", "intro").unwrap();
        let mark = WrapperMark {
            annotation_id: AnnotationId::new("h1"),
            kind: AnnotationKind::Text,
            color: Some("#ffff00".to_string()),
            label: None,
        };
        doc.wrap_range(intro, 7, 20, mark).unwrap();

        let config = HighlightConfig {
            include_inline_styles: false,
            ..HighlightConfig::default()
        };
        assert_eq!(
            doc.to_markup(&config),
            r#"<p id="intro">We use <span class="ll-highlight ll-highlight-text" data-annotation-id="h1" data-annotation-type="text"><em>Deep Learning</em></span> models.</p>"#
        );
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let doc = parse_markup("ch1.xhtml", "<p>one</span> two</p>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "one two");
    }

    #[test]
    fn test_untrusted_markup_is_sanitized() {
        let doc = DocumentHost::from_untrusted_markup(
            "ch1.xhtml",
            r#"<p onclick="x()">Safe</p><script>alert(1)</script>"#,
        )
        .unwrap();
        let markup = doc.to_markup(&HighlightConfig::default());

        assert_eq!(markup, "<p>Safe</p>");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".xhtml").tempfile().unwrap();
        write!(file, "{}", CHAPTER).unwrap();

        let doc = DocumentHost::load(file.path()).unwrap();
        assert!(doc.source().ends_with(".xhtml"));
        assert!(doc.find_by_attribute("id", "intro").is_some());
    }
}

//! Operation scripts
//!
//! A script is a JSON array of operations replayed against one context. Hosts
//! are named by their `id` attribute; a create targets either character
//! offsets or a quote resolved with optional context.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anchor::{resolve_text_quote, TextSpan};
use crate::annotations::{AnnotationId, AnnotationPayload};
use crate::context::AnnotationContext;
use crate::document::NodeId;
use crate::error::AnchorError;
use crate::reconcile::{CreateRequest, ReconciliationController, UpdateRequest};

/// Where a create lands inside its host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Offsets {
        start: usize,
        end: usize,
    },
    Quote {
        exact: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Create {
        #[serde(default)]
        id: Option<AnnotationId>,
        host: String,
        target: TargetSpec,
        payload: AnnotationPayload,
        #[serde(default)]
        text: Option<String>,
    },
    Update {
        id: AnnotationId,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        start: Option<usize>,
        #[serde(default)]
        end: Option<usize>,
        #[serde(default)]
        payload: Option<AnnotationPayload>,
    },
    Delete {
        id: AnnotationId,
    },
    Frame,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
            Operation::Frame => "frame",
        }
    }
}

/// An operation that did not apply
#[derive(Debug, Clone, Serialize)]
pub struct ScriptFailure {
    pub index: usize,
    pub op: &'static str,
    /// Engine error code, when the engine rejected the operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptReport {
    pub applied: usize,
    pub failures: Vec<ScriptFailure>,
}

impl ScriptReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn parse_script(json: &str) -> Result<Vec<Operation>> {
    serde_json::from_str(json).context("Invalid operation script")
}

pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<Operation>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&json)
}

/// Replay operations in order
///
/// A failing operation is recorded and the script carries on.
pub fn run_script(
    ctx: &mut AnnotationContext,
    controller: &mut ReconciliationController,
    ops: Vec<Operation>,
) -> ScriptReport {
    let mut report = ScriptReport::default();
    for (index, op) in ops.into_iter().enumerate() {
        let name = op.name();
        match apply(ctx, controller, op).with_context(|| format!("{} #{}", name, index)) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!("{:#}", e);
                report.failures.push(ScriptFailure {
                    index,
                    op: name,
                    code: e.downcast_ref::<AnchorError>().map(AnchorError::code),
                    message: format!("{:#}", e),
                });
            }
        }
    }
    info!(
        "Script finished: {} applied, {} failed",
        report.applied,
        report.failures.len()
    );
    report
}

fn host_by_id(ctx: &AnnotationContext, host: &str) -> Result<NodeId> {
    ctx.document()
        .find_by_attribute("id", host)
        .ok_or_else(|| anyhow!("No element with id {:?}", host))
}

fn apply(
    ctx: &mut AnnotationContext,
    controller: &mut ReconciliationController,
    op: Operation,
) -> Result<()> {
    match op {
        Operation::Create {
            id,
            host,
            target,
            payload,
            text,
        } => {
            let host = host_by_id(ctx, &host)?;
            let span = match target {
                TargetSpec::Offsets { start, end } => TextSpan::new(host, start, end),
                TargetSpec::Quote {
                    exact,
                    prefix,
                    suffix,
                } => resolve_text_quote(
                    ctx.document(),
                    host,
                    &exact,
                    prefix.as_deref(),
                    suffix.as_deref(),
                )
                .ok_or_else(|| anyhow!("Quote {:?} not found", exact))?,
            };
            let mut request = CreateRequest::new(span, payload);
            request.id = id;
            request.text = text;
            let id = controller.create(ctx, request)?;
            info!("Created {}", id);
        }
        Operation::Update {
            id,
            host,
            start,
            end,
            payload,
        } => {
            let mut request = UpdateRequest::new(id.clone());
            match (start, end) {
                (Some(start), Some(end)) => {
                    let host = match host {
                        Some(host) => host_by_id(ctx, &host)?,
                        None => ctx
                            .registry()
                            .get(id.as_str())
                            .map(|annotation| annotation.anchor.host)
                            .ok_or_else(|| anyhow!("Unknown annotation {}", id))?,
                    };
                    request = request.with_span(TextSpan::new(host, start, end));
                }
                (None, None) => {}
                _ => bail!("Update needs both start and end"),
            }
            request.payload = payload;
            controller.update(ctx, request)?;
            info!("Updated {}", id);
        }
        Operation::Delete { id } => {
            let report = controller.delete(ctx, id.as_str())?;
            if let Some(e) = report.unwrap_error {
                warn!("Deleted {} with unwrap error: {}", id, e);
            } else {
                info!("Deleted {}", id);
            }
        }
        Operation::Frame => {
            let report = controller.run_frame(ctx);
            info!(
                "Frame {}: {} swept, {} marker(s) created",
                report.frame,
                report.swept.len(),
                report.markers_created
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::document::DocumentHost;

    const CHAPTER: &str = r#"<section><h2 id="title">Methods</h2><p id="intro">We use <em>Deep Learning</em> models. Deep models.</p></section>"#;

    fn context() -> AnnotationContext {
        let doc = DocumentHost::from_markup("ch3.xhtml", CHAPTER).unwrap();
        AnnotationContext::new(Config::default(), doc)
    }

    #[test]
    fn test_parse_script() {
        let ops = parse_script(
            r#"[
                {"op": "create", "id": "h1", "host": "intro",
                 "target": {"start": 7, "end": 20},
                 "payload": {"type": "text", "label": "Technique"}},
                {"op": "create", "host": "intro",
                 "target": {"exact": "Deep", "prefix": "models. "},
                 "payload": {"type": "image", "label": "Figure", "altText": "a chart"}},
                {"op": "update", "id": "h1", "start": 3, "end": 11},
                {"op": "delete", "id": "h1"},
                {"op": "frame"}
            ]"#,
        )
        .unwrap();

        assert_eq!(ops.len(), 5);
        assert_eq!(
            ops.iter().map(Operation::name).collect::<Vec<_>>(),
            vec!["create", "create", "update", "delete", "frame"]
        );
        match &ops[1] {
            Operation::Create { id, target, .. } => {
                assert!(id.is_none());
                assert_eq!(
                    target,
                    &TargetSpec::Quote {
                        exact: "Deep".to_string(),
                        prefix: Some("models. ".to_string()),
                        suffix: None,
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_script_rejects_unknown_op() {
        let err = parse_script(r#"[{"op": "rename", "id": "h1"}]"#).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid operation script"));
    }

    #[test]
    fn test_run_script() {
        let mut ctx = context();
        let mut controller = ReconciliationController::new();
        let ops = parse_script(
            r#"[
                {"op": "create", "id": "h1", "host": "intro",
                 "target": {"start": 7, "end": 20}, "text": "Deep Learning",
                 "payload": {"type": "text", "label": "Technique"}},
                {"op": "create", "id": "h2", "host": "intro",
                 "target": {"exact": "Deep", "prefix": "models. "},
                 "payload": {"type": "text", "label": "Adjective"}},
                {"op": "update", "id": "h1", "start": 3, "end": 11},
                {"op": "frame"}
            ]"#,
        )
        .unwrap();

        let report = run_script(&mut ctx, &mut controller, ops);
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.applied, 4);

        let intro = ctx.document().find_by_attribute("id", "intro").unwrap();
        let h2 = ctx.anchors().locate(ctx.document(), "h2").unwrap();
        assert_eq!(h2.host, intro);
        assert_eq!(h2.range(ctx.document()), Some((29, 33)));
        assert_eq!(
            ctx.registry().get("h1").unwrap().anchor.text,
            "use Deep"
        );
    }

    #[test]
    fn test_run_script_records_failures() {
        let mut ctx = context();
        let mut controller = ReconciliationController::new();
        let ops = parse_script(
            r#"[
                {"op": "create", "id": "h1", "host": "missing",
                 "target": {"start": 0, "end": 2},
                 "payload": {"type": "text", "label": "x"}},
                {"op": "create", "id": "h2", "host": "title",
                 "target": {"start": 0, "end": 7},
                 "payload": {"type": "text", "label": "Heading"}},
                {"op": "update", "id": "h2", "start": 1},
                {"op": "delete", "id": "h1"}
            ]"#,
        )
        .unwrap();

        let report = run_script(&mut ctx, &mut controller, ops);
        assert_eq!(report.applied, 1);
        assert_eq!(
            report.failures.iter().map(|f| (f.index, f.op)).collect::<Vec<_>>(),
            vec![(0, "create"), (2, "update"), (3, "delete")]
        );
        assert!(report.failures[0].message.contains("missing"));
        assert_eq!(report.failures[0].code, None);
        assert_eq!(report.failures[2].code, Some("anchor_not_found"));
        assert!(ctx.registry().contains("h2"));
    }

    #[test]
    fn test_load_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.json");
        std::fs::write(&path, r#"[{"op": "frame"}]"#).unwrap();
        assert_eq!(load_script(&path).unwrap(), vec![Operation::Frame]);

        let err = load_script(dir.path().join("absent.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read script"));
    }
}

//! Los Libros Anchors CLI
//!
//! Replays an operation script against a chapter, streams lifecycle events to
//! stderr as JSON lines and prints the resulting markup.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use los_libros_anchors::events::ChannelForwarder;
use los_libros_anchors::ops;
use los_libros_anchors::{AnnotationContext, Config, DocumentHost, ReconciliationController};

#[derive(Parser, Debug)]
#[command(name = "los-libros-anchors")]
#[command(about = "Replay annotation operations against a chapter", long_about = None)]
#[command(version)]
struct Args {
    /// Chapter markup (XHTML or HTML)
    chapter: PathBuf,

    /// JSON array of operations
    script: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "los_libros_anchors=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let document = DocumentHost::load(&args.chapter)
        .with_context(|| format!("Failed to load chapter {}", args.chapter.display()))?;
    let operations = ops::load_script(&args.script)?;

    tracing::info!(
        "Replaying {} operation(s) on {}",
        operations.len(),
        document.source()
    );

    let mut ctx = AnnotationContext::new(config, document);
    let mut controller = ReconciliationController::new();

    let (forwarder, mut receiver) = ChannelForwarder::channel(ctx.bus_mut());
    let printer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => tracing::error!("Could not encode {}: {}", message.event, e),
            }
        }
    });

    let report = ops::run_script(&mut ctx, &mut controller, operations);
    forwarder.detach(ctx.bus_mut());
    printer.await.context("Event printer failed")?;

    println!("{}", ctx.to_markup());

    if !report.is_clean() {
        tracing::warn!("{} operation(s) failed", report.failures.len());
        std::process::exit(1);
    }
    Ok(())
}

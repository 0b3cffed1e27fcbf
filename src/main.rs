//! Receipt Pipeline server and CLI.
//!
//! Entry point: `serve` (default) runs the HTTP API, `process` runs the
//! pipeline over local files, `export` writes stored receipts as CSV.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use receipt_pipeline::config::{AppConfig, Cli, Command, ExportKind, LogConfig};
use receipt_pipeline::pipeline::{ItemStatus, PipelineStatus, SubmittedFile};
use receipt_pipeline::{export, server, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before clap reads env-backed flags
    let _ = dotenv();

    let cli = Cli::parse();
    let config = match AppConfig::from_cli(&cli) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::start_server(config).await,
        Command::Process { files } => process_files(config, &files).await,
        Command::Export { kind, output } => export_receipts(&config, kind, output.as_deref()).await,
    }
}

/// Initialize tracing (M-LOG-STRUCTURED)
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log.is_json() {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Run the pipeline once over local files and report per-file outcomes.
async fn process_files(config: Arc<AppConfig>, paths: &[PathBuf]) -> anyhow::Result<()> {
    let state = server::build_state(config).await?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        files.push(SubmittedFile::new(name, bytes));
    }

    let report = state.controller.enqueue(files);
    for rejected in &report.rejected {
        warn!(file = %rejected.name, reason = %rejected.reason, "File rejected");
    }

    state.controller.wait_until_settled().await;
    let snapshot = state.controller.snapshot();

    let mut stdout = tokio::io::stdout();
    for item in &snapshot.items {
        let line = match item.status {
            ItemStatus::Success => format!(
                "ok      {} -> receipt #{}\n",
                item.id,
                item.record_id.unwrap_or_default()
            ),
            ItemStatus::Error => format!(
                "error   {}: {}\n",
                item.id,
                item.error.as_deref().unwrap_or("unknown error")
            ),
            ItemStatus::Queued | ItemStatus::Processing => format!("pending {}\n", item.id),
        };
        stdout.write_all(line.as_bytes()).await?;
    }
    stdout.flush().await?;

    if snapshot.status == PipelineStatus::Paused {
        warn!(
            name: "pipeline.stopped.paused",
            remaining = snapshot.queued,
            "Pipeline paused before the queue drained (quota exhausted?)"
        );
    }
    info!(
        name: "pipeline.process.finished",
        total = snapshot.items.len(),
        "Processing finished"
    );
    Ok(())
}

async fn export_receipts(
    config: &AppConfig,
    kind: ExportKind,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let store = store::connect(&config.storage).await?;
    let receipts = store.list_all().await?;
    let csv = export::export_csv(kind, &receipts)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &csv)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                name: "export.written",
                path = %path.display(),
                receipts = receipts.len(),
                "Export written"
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&csv).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

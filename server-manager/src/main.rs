//! Renders the map, publishes artifacts, then runs the game server until it
//! exits or Ctrl-C is pressed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use server_manager::cancellation::CancellationToken;
use server_manager::config::RawConfig;
use server_manager::observability::{init_tracing, LogFormat};
use server_manager::pipeline::{Orchestrator, EXIT_CONFIG_ERROR, EXIT_STAGE_FAILED};
use server_manager::process::TokioProcessRunner;
use server_manager::storage::BlobConnector;

#[tokio::main]
async fn main() -> ExitCode {
    let raw = RawConfig::from_env();
    init_tracing(LogFormat::from_setting(raw.log_format.as_deref()));

    match run(&raw).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = ?e, "Server manager failed");
            ExitCode::from(EXIT_STAGE_FAILED)
        }
    }
}

async fn run(raw: &RawConfig) -> anyhow::Result<u8> {
    let cancel = Arc::new(CancellationToken::new());
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received; shutting down");
                signal_token.cancel("interrupted");
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let runner = Arc::new(TokioProcessRunner::with_cancellation(cancel.clone()));
    let orchestrator =
        Orchestrator::new(runner, Arc::new(BlobConnector)).with_cancellation(cancel.clone());

    let Ok(mut report) = orchestrator.execute(raw).await else {
        return Ok(EXIT_CONFIG_ERROR);
    };

    let summary = report.summary_json().context("serializing run summary")?;
    info!(summary = %summary, "Run summary");

    if let Some(server) = report.take_server() {
        let label = server.label().to_string();
        match server
            .supervise(&cancel)
            .await
            .with_context(|| format!("supervising {label}"))?
        {
            Some(exit) => info!(code = ?exit.code, "Server stopped"),
            None => info!("Server shut down after interrupt"),
        }
    }

    Ok(report.exit_code())
}

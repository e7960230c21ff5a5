//! Sequences the stages of one run.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::RunReport;
use crate::cancellation::CancellationToken;
use crate::config::{RawConfig, ServerConfig};
use crate::core::{StageName, StageOutcome, StageStatus};
use crate::errors::{ConfigError, StageError, StorageError};
use crate::events::{
    EventSink, LoggingEventSink, RUN_COMPLETED, STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED,
    STAGE_STARTED,
};
use crate::manifest;
use crate::process::{CommandSpec, ProcessRunner};
use crate::render::ArtifactStager;
use crate::storage::{StorageSync, StoreConnector};
use crate::{MAP_OBJECT_NAME, MODLIST_OBJECT_NAME};

const MAP_CONTENT_TYPE: &str = "image/jpeg";
const MODLIST_CONTENT_TYPE: &str = "application/json";

/// Runs Validate, RenderMap, PublishMap, PublishManifest and LaunchServer in order.
///
/// Only invalid configuration stops a run. Every other failure is recorded
/// in the [`RunReport`] and the run continues to the server launch. Once
/// the cancellation token fires, stages that have not started are skipped
/// and the server is never launched.
pub struct Orchestrator {
    runner: Arc<dyn ProcessRunner>,
    connector: Arc<dyn StoreConnector>,
    events: Arc<dyn EventSink>,
    cancel: Option<Arc<CancellationToken>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator that logs stage events.
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            runner,
            connector,
            events: Arc::new(LoggingEventSink::default()),
            cancel: None,
        }
    }

    /// Skips the remaining stages once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates `raw` and runs every stage.
    ///
    /// Invalid configuration returns before any process is started or the
    /// store is contacted.
    pub async fn execute(&self, raw: &RawConfig) -> Result<RunReport, ConfigError> {
        let config = raw.validate().map_err(|e| {
            error!(error = %e, "Configuration is incomplete; nothing was run");
            e
        })?;
        config.log_resolved();
        Ok(self.run(&config).await)
    }

    /// Runs every stage against validated configuration.
    pub async fn run(&self, config: &ServerConfig) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.run_stages(run_id, config).instrument(span).await
    }

    async fn run_stages(&self, run_id: Uuid, config: &ServerConfig) -> RunReport {
        let mut report = RunReport::new(run_id);
        info!("Starting run");

        self.record(&mut report, StageOutcome::success(StageName::Validate, Utc::now()))
            .await;

        let sync = match self.connector.connect(&config.storage) {
            Ok(store) => Ok(StorageSync::new(store, config.storage.retry.clone())),
            Err(e) => {
                error!(error = %e, "Could not connect to storage; publishing will fail");
                Err(e.to_string())
            }
        };

        let render = match self.skip_if_interrupted(StageName::RenderMap) {
            Some(skipped) => skipped,
            None => {
                self.stage_started(StageName::RenderMap).await;
                ArtifactStager::new(self.runner.clone())
                    .stage_render(
                        &config.world_path,
                        &config.renderer_path,
                        &config.output_dir,
                        config.render_timeout,
                    )
                    .await
            }
        };
        let rendered = render.is_success();
        self.record(&mut report, render).await;

        let publish_map = if let Some(skipped) = self.skip_if_interrupted(StageName::PublishMap) {
            skipped
        } else if rendered {
            self.stage_started(StageName::PublishMap).await;
            self.publish_map(config, sync.as_ref()).await
        } else {
            warn!("Map was not rendered; skipping upload");
            StageOutcome::skipped(StageName::PublishMap, "map was not rendered")
        };
        self.record(&mut report, publish_map).await;

        let interrupted = self.skip_if_interrupted(StageName::PublishManifest);
        let publish_manifest = match (interrupted, &config.modlist_path) {
            (Some(skipped), _) => skipped,
            (None, Some(path)) => {
                self.stage_started(StageName::PublishManifest).await;
                self.publish_manifest(path, config, sync.as_ref()).await
            }
            (None, None) => {
                info!("No mod list configured; skipping manifest upload");
                StageOutcome::skipped(StageName::PublishManifest, "no mod list configured")
            }
        };
        self.record(&mut report, publish_manifest).await;

        let launch = match self.skip_if_interrupted(StageName::LaunchServer) {
            Some(skipped) => skipped,
            None => {
                self.stage_started(StageName::LaunchServer).await;
                self.launch_server(config, &mut report).await
            }
        };
        self.record(&mut report, launch).await;

        report.finish();
        let failed = report.failed();
        info!(
            exit_code = report.exit_code(),
            failed = ?failed,
            skipped = ?report.skipped(),
            "Run complete"
        );
        self.events
            .emit(
                RUN_COMPLETED,
                Some(json!({
                    "run_id": run_id.to_string(),
                    "exit_code": report.exit_code(),
                    "failed": failed,
                })),
            )
            .await;
        report
    }

    fn skip_if_interrupted(&self, stage: StageName) -> Option<StageOutcome> {
        self.cancel
            .as_deref()
            .filter(|token| token.is_cancelled())
            .map(|_| self.interrupted(stage))
    }

    fn interrupted(&self, stage: StageName) -> StageOutcome {
        let reason = self
            .cancel
            .as_deref()
            .and_then(CancellationToken::reason)
            .unwrap_or_else(|| "cancelled".to_string());
        warn!(stage = %stage, reason = %reason, "Run interrupted; skipping stage");
        StageOutcome::skipped(stage, format!("interrupted: {reason}"))
    }

    async fn publish_map(
        &self,
        config: &ServerConfig,
        sync: Result<&StorageSync, &String>,
    ) -> StageOutcome {
        let started = Utc::now();
        let stage = StageName::PublishMap;
        let sync = match sync {
            Ok(sync) => sync,
            Err(e) => {
                let detail = format!("storage unavailable: {e}");
                return StageOutcome::hard_failure(stage, started, detail);
            }
        };

        let path = config.map_path();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(source) => {
                let e = StageError::ReadArtifact { path, source };
                error!(stage = %stage, error = %e, "Could not read rendered map");
                return StageOutcome::hard_failure(stage, started, e.to_string());
            }
        };

        let result = sync
            .replace_object(
                &config.storage.map_container,
                MAP_OBJECT_NAME,
                &content,
                MAP_CONTENT_TYPE,
            )
            .await;
        publish_outcome(stage, started, result)
    }

    async fn publish_manifest(
        &self,
        document: &std::path::Path,
        config: &ServerConfig,
        sync: Result<&StorageSync, &String>,
    ) -> StageOutcome {
        let started = Utc::now();
        let stage = StageName::PublishManifest;

        let manifest = match manifest::extract(document).await {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(stage = %stage, error = %e, "Mod list could not be parsed");
                return StageOutcome::hard_failure(stage, started, e.to_string());
            }
        };
        if manifest.is_empty() {
            info!(stage = %stage, path = %document.display(), "Mod list has no entries");
        } else {
            info!(stage = %stage, entries = manifest.len(), "Extracted mod list");
        }

        let content = match manifest.to_json_bytes() {
            Ok(content) => content,
            Err(e) => {
                error!(stage = %stage, error = %e, "Could not serialize mod list");
                return StageOutcome::hard_failure(stage, started, e.to_string());
            }
        };

        let sync = match sync {
            Ok(sync) => sync,
            Err(e) => {
                let detail = format!("storage unavailable: {e}");
                return StageOutcome::hard_failure(stage, started, detail);
            }
        };
        let result = sync
            .replace_object(
                &config.storage.modlist_container,
                MODLIST_OBJECT_NAME,
                &content,
                MODLIST_CONTENT_TYPE,
            )
            .await;
        publish_outcome(stage, started, result)
    }

    async fn launch_server(&self, config: &ServerConfig, report: &mut RunReport) -> StageOutcome {
        let started = Utc::now();
        let stage = StageName::LaunchServer;
        let command = CommandSpec::server_script(&config.server_script);

        match self.runner.spawn(&command).await {
            Ok(process) => {
                info!(
                    stage = %stage,
                    pid = ?process.pid(),
                    script = %config.server_script.display(),
                    "Server started"
                );
                let pid = process
                    .pid()
                    .map_or_else(|| "unknown".to_string(), |p| p.to_string());
                let detail = format!("pid {pid}");
                report.attach_server(process);
                StageOutcome::success(stage, started).with_detail(detail)
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Server could not be started");
                StageOutcome::hard_failure(stage, started, e.to_string())
            }
        }
    }

    async fn stage_started(&self, stage: StageName) {
        self.events
            .emit(STAGE_STARTED, Some(json!({ "stage": stage })))
            .await;
    }

    async fn record(&self, report: &mut RunReport, outcome: StageOutcome) {
        let event = match outcome.status {
            StageStatus::Success => STAGE_COMPLETED,
            StageStatus::Skipped => STAGE_SKIPPED,
            StageStatus::SoftFailure | StageStatus::HardFailure => STAGE_FAILED,
        };
        self.events
            .emit(
                event,
                Some(json!({
                    "stage": outcome.stage,
                    "status": outcome.status,
                    "detail": outcome.detail,
                    "duration_ms": outcome.duration_ms(),
                })),
            )
            .await;
        report.record(outcome);
    }
}

fn publish_outcome(
    stage: StageName,
    started: chrono::DateTime<Utc>,
    result: Result<crate::storage::ObjectHandle, StorageError>,
) -> StageOutcome {
    match result {
        Ok(handle) => StageOutcome::success(stage, started).with_detail(format!("etag {handle}")),
        Err(e) if e.is_soft() => {
            warn!(stage = %stage, error = %e, "Upload did not complete");
            StageOutcome::soft_failure(stage, started, e.to_string())
        }
        Err(e) => {
            error!(stage = %stage, error = %e, transient = e.is_transient(), "Upload failed");
            StageOutcome::hard_failure(stage, started, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::storage::InMemoryObjectStore;
    use crate::testing::{raw_config, ScriptedProcessRunner, ScriptedRun};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_events_follow_stage_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedProcessRunner::new().on_run(ScriptedRun::Exit(1)));
        let store = Arc::new(InMemoryObjectStore::new());
        let events = Arc::new(CollectingEventSink::new());

        let report = Orchestrator::new(runner, Arc::new(store))
            .with_event_sink(events.clone())
            .execute(&raw_config(dir.path()))
            .await
            .unwrap();

        assert!(report.is_done());
        assert_eq!(
            events.event_types(),
            vec![
                STAGE_COMPLETED,
                STAGE_STARTED,
                STAGE_FAILED,
                STAGE_SKIPPED,
                STAGE_SKIPPED,
                STAGE_STARTED,
                STAGE_COMPLETED,
                RUN_COMPLETED,
            ]
        );
        let failed = events.events_of_type(STAGE_FAILED);
        assert_eq!(failed[0].as_ref().unwrap()["stage"], json!("render_map"));
        let completed = events.events_of_type(RUN_COMPLETED);
        assert_eq!(completed[0].as_ref().unwrap()["exit_code"], json!(1));
    }

    #[tokio::test]
    async fn test_invalid_numeric_setting_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedProcessRunner::new());
        let store = Arc::new(InMemoryObjectStore::new());
        let raw = RawConfig {
            storage_max_attempts: Some("many".to_string()),
            ..raw_config(dir.path())
        };

        let err = Orchestrator::new(runner.clone(), Arc::new(store.clone()))
            .execute(&raw)
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(runner.call_count(), 0);
        assert_eq!(store.delete_calls() + store.upload_calls(), 0);
    }
}

//! The record of one run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{StageName, StageOutcome, StageStatus};
use crate::process::ManagedProcess;

/// Exit code when the run completed without any failed stage.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code when at least one stage failed.
pub const EXIT_STAGE_FAILED: u8 = 1;
/// Exit code when required configuration was missing or invalid.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Everything one run produced: stage outcomes and the launched server.
///
/// The report owns the server process. Dropping the report without taking
/// the server out of it stops the server.
#[derive(Debug)]
pub struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    outcomes: Vec<StageOutcome>,
    server: Option<ManagedProcess>,
}

/// Serializable view of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached Done.
    pub ended_at: Option<DateTime<Utc>>,
    /// Outcomes in execution order.
    pub stages: Vec<StageOutcome>,
    /// Process id of the launched server.
    pub server_pid: Option<u32>,
    /// Process exit code implied by the outcomes.
    pub exit_code: u8,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            ended_at: None,
            outcomes: Vec::new(),
            server: None,
        }
    }

    pub(crate) fn record(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn attach_server(&mut self, server: ManagedProcess) {
        self.server = Some(server);
    }

    pub(crate) fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether the run reached Done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Outcomes in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.outcomes
    }

    /// Outcome of `stage`, if it was recorded.
    #[must_use]
    pub fn outcome(&self, stage: StageName) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Stages that were not entered.
    #[must_use]
    pub fn skipped(&self) -> Vec<StageName> {
        self.stages_with(|s| s == StageStatus::Skipped)
    }

    /// Stages that ran and failed.
    #[must_use]
    pub fn failed(&self) -> Vec<StageName> {
        self.stages_with(|s| s.is_failure())
    }

    fn stages_with(&self, predicate: impl Fn(StageStatus) -> bool) -> Vec<StageName> {
        self.outcomes
            .iter()
            .filter(|o| predicate(o.status))
            .map(|o| o.stage)
            .collect()
    }

    /// The launched server, if launch succeeded and it has not been taken.
    #[must_use]
    pub fn server(&self) -> Option<&ManagedProcess> {
        self.server.as_ref()
    }

    /// Takes ownership of the launched server.
    pub fn take_server(&mut self) -> Option<ManagedProcess> {
        self.server.take()
    }

    /// `0` when no stage failed, `1` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.outcomes.iter().any(StageOutcome::is_failure) {
            EXIT_STAGE_FAILED
        } else {
            EXIT_SUCCESS
        }
    }

    /// Serializable summary of the run.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            stages: self.outcomes.clone(),
            server_pid: self.server.as_ref().and_then(ManagedProcess::pid),
            exit_code: self.exit_code(),
        }
    }

    /// The summary as a JSON value.
    pub fn summary_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedProcess;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exit_code_follows_failures() {
        let now = Utc::now();
        let mut report = RunReport::new(Uuid::new_v4());
        report.record(StageOutcome::success(StageName::Validate, now));
        report.record(StageOutcome::skipped(StageName::PublishManifest, "no mod list configured"));
        assert_eq!(report.exit_code(), EXIT_SUCCESS);

        report.record(StageOutcome::soft_failure(StageName::RenderMap, now, "no map.jpg"));
        assert_eq!(report.exit_code(), EXIT_STAGE_FAILED);
        assert_eq!(report.failed(), vec![StageName::RenderMap]);
        assert_eq!(report.skipped(), vec![StageName::PublishManifest]);
    }

    #[test]
    fn test_summary_json() {
        let run_id = Uuid::new_v4();
        let mut report = RunReport::new(run_id);
        report.record(StageOutcome::success(StageName::Validate, Utc::now()));
        report.attach_server(ManagedProcess::new("sh", Box::new(SimulatedProcess::running(77))));
        report.finish();

        let summary = report.summary_json().unwrap();
        assert_eq!(summary["run_id"], serde_json::json!(run_id.to_string()));
        assert_eq!(summary["server_pid"], serde_json::json!(77));
        assert_eq!(summary["exit_code"], serde_json::json!(0));
        assert_eq!(summary["stages"][0]["stage"], serde_json::json!("validate"));
        assert_eq!(summary["stages"][0]["status"], serde_json::json!("success"));
        assert!(report.is_done());
    }

    #[test]
    fn test_take_server_releases_ownership() {
        let mut report = RunReport::new(Uuid::new_v4());
        report.attach_server(ManagedProcess::new("sh", Box::new(SimulatedProcess::exiting(5, 0))));

        let server = report.take_server().unwrap();
        assert_eq!(server.pid(), Some(5));
        assert!(report.server().is_none());
        assert_eq!(report.summary().server_pid, None);
    }
}

//! The result of one pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StageName, StageStatus};

/// Outcome of one stage, consumed by the orchestrator to pick the next action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Which stage ran.
    pub stage: StageName,
    /// How it ended.
    pub status: StageStatus,
    /// Human-readable detail: skip reason, failure diagnostic, or artifact note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageOutcome {
    fn finish(
        stage: StageName,
        status: StageStatus,
        started_at: DateTime<Utc>,
        detail: Option<String>,
    ) -> Self {
        Self {
            stage,
            status,
            detail,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// A successful stage.
    #[must_use]
    pub fn success(stage: StageName, started_at: DateTime<Utc>) -> Self {
        Self::finish(stage, StageStatus::Success, started_at, None)
    }

    /// A stage that was not entered.
    #[must_use]
    pub fn skipped(stage: StageName, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            stage,
            status: StageStatus::Skipped,
            detail: Some(reason.into()),
            started_at: now,
            ended_at: now,
        }
    }

    /// A stage that completed without a usable artifact.
    #[must_use]
    pub fn soft_failure(
        stage: StageName,
        started_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self::finish(stage, StageStatus::SoftFailure, started_at, Some(detail.into()))
    }

    /// A stage interrupted by a fault.
    #[must_use]
    pub fn hard_failure(
        stage: StageName,
        started_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self::finish(stage, StageStatus::HardFailure, started_at, Some(detail.into()))
    }

    /// Attaches detail to an outcome.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_outcome() {
        let outcome = StageOutcome::success(StageName::PublishMap, Utc::now());

        assert!(outcome.is_success());
        assert!(!outcome.is_failure());
        assert!(outcome.detail.is_none());
    }

    #[test]
    fn test_failure_outcomes_carry_detail() {
        let started = Utc::now();
        let soft = StageOutcome::soft_failure(StageName::RenderMap, started, "no map.jpg");
        let hard = StageOutcome::hard_failure(StageName::RenderMap, started, "spawn failed");

        assert_eq!(soft.status, StageStatus::SoftFailure);
        assert_eq!(hard.status, StageStatus::HardFailure);
        assert_eq!(soft.detail.as_deref(), Some("no map.jpg"));
        assert!(soft.is_failure() && hard.is_failure());
    }

    #[test]
    fn test_skipped_outcome() {
        let outcome = StageOutcome::skipped(StageName::PublishManifest, "no mod list configured");

        assert_eq!(outcome.status, StageStatus::Skipped);
        assert!(!outcome.is_failure());
        assert_eq!(outcome.duration_ms(), 0);
    }

    #[test]
    fn test_duration() {
        let started = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let outcome = StageOutcome::success(StageName::RenderMap, started);

        assert!(outcome.duration_ms() >= 10);
    }

    #[test]
    fn test_serialization_omits_empty_detail() {
        let outcome = StageOutcome::success(StageName::LaunchServer, Utc::now());
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["stage"], "launch_server");
        assert_eq!(json["status"], "success");
        assert!(json.get("detail").is_none());
    }
}

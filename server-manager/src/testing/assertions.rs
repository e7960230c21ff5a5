//! Assertions over stage outcomes.

use crate::core::{StageName, StageOutcome, StageStatus};

/// Asserts that the outcome succeeded.
pub fn assert_stage_succeeded(outcome: &StageOutcome) {
    assert!(
        outcome.is_success(),
        "Expected {} to succeed, got {:?} ({:?})",
        outcome.stage,
        outcome.status,
        outcome.detail
    );
}

/// Asserts that the outcome has the given status.
pub fn assert_stage_status(outcome: &StageOutcome, expected: StageStatus) {
    assert_eq!(
        outcome.status, expected,
        "Unexpected status for {} ({:?})",
        outcome.stage, outcome.detail
    );
}

/// Asserts the stages recorded, in order.
pub fn assert_stage_order(outcomes: &[StageOutcome], expected: &[StageName]) {
    let actual: Vec<StageName> = outcomes.iter().map(|o| o.stage).collect();
    assert_eq!(actual, expected, "Unexpected stage sequence");
}

/// Asserts that the outcome's detail mentions `needle`.
pub fn assert_detail_contains(outcome: &StageOutcome, needle: &str) {
    let detail = outcome.detail.as_deref().unwrap_or_default();
    assert!(
        detail.contains(needle),
        "Expected detail of {} to contain {needle:?}, got {detail:?}",
        outcome.stage
    );
}

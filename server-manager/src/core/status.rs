//! Stage identity and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Required configuration is present.
    Validate,
    /// The renderer regenerates the map image.
    RenderMap,
    /// The map image is uploaded.
    PublishMap,
    /// The mod manifest is extracted and uploaded.
    PublishManifest,
    /// The game server is started.
    LaunchServer,
}

impl StageName {
    /// Every stage, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Validate,
        Self::RenderMap,
        Self::PublishMap,
        Self::PublishManifest,
        Self::LaunchServer,
    ];

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::RenderMap => "render_map",
            Self::PublishMap => "publish_map",
            Self::PublishManifest => "publish_manifest",
            Self::LaunchServer => "launch_server",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage produced its artifact.
    Success,
    /// The stage was not entered.
    Skipped,
    /// The stage ran to completion but produced nothing usable.
    SoftFailure,
    /// A fault interrupted the stage.
    HardFailure,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Skipped => write!(f, "skipped"),
            Self::SoftFailure => write!(f, "soft_failure"),
            Self::HardFailure => write!(f, "hard_failure"),
        }
    }
}

impl StageStatus {
    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the stage ran and failed, softly or not.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SoftFailure | Self::HardFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_display() {
        assert_eq!(StageName::RenderMap.to_string(), "render_map");
        assert_eq!(StageName::PublishManifest.to_string(), "publish_manifest");
    }

    #[test]
    fn test_stage_order() {
        let mut shuffled =
            vec![StageName::LaunchServer, StageName::Validate, StageName::PublishMap];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![StageName::Validate, StageName::PublishMap, StageName::LaunchServer]
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(StageStatus::Success.is_success());
        assert!(!StageStatus::Skipped.is_success());
        assert!(!StageStatus::Skipped.is_failure());
        assert!(StageStatus::SoftFailure.is_failure());
        assert!(StageStatus::HardFailure.is_failure());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StageStatus::SoftFailure).unwrap();
        assert_eq!(json, r#""soft_failure""#);

        let name: StageName = serde_json::from_str(r#""publish_map""#).unwrap();
        assert_eq!(name, StageName::PublishMap);
    }
}

//! Regenerates the map image through the external renderer.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::map_path;
use crate::core::{StageName, StageOutcome};
use crate::errors::StageError;
use crate::process::{CommandSpec, ProcessRunner};

/// Builds the renderer invocation for `world`, writing `map.jpg` under `output_dir`.
#[must_use]
pub fn render_command(
    renderer: &Path,
    world: &Path,
    output_dir: &Path,
    timeout: Option<Duration>,
) -> CommandSpec {
    let mut world_arg = std::ffi::OsString::from("--world=");
    world_arg.push(world);
    let mut output_arg = std::ffi::OsString::from("--output=");
    output_arg.push(map_path(output_dir));

    CommandSpec::new(renderer)
        .args(["image", "render", "--trim", "--shadows=true"])
        .arg(world_arg)
        .arg(output_arg)
        .timeout(timeout)
}

/// Clears stale output and runs the renderer.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    runner: Arc<dyn ProcessRunner>,
}

impl ArtifactStager {
    /// Creates a stager that runs the renderer through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Renders `world` into `output_dir/map.jpg`.
    ///
    /// Succeeds only if the renderer left a non-empty `map.jpg` behind. A
    /// renderer that exits without one is a soft failure; failing to prepare
    /// the output, start the renderer, or wait for it is a hard failure.
    pub async fn stage_render(
        &self,
        world: &Path,
        renderer: &Path,
        output_dir: &Path,
        timeout: Option<Duration>,
    ) -> StageOutcome {
        let started = Utc::now();
        let stage = StageName::RenderMap;

        if let Err(e) = clear_output(output_dir).await {
            error!(stage = %stage, error = %e, "Could not prepare render output");
            return StageOutcome::hard_failure(stage, started, e.to_string());
        }

        let command = render_command(renderer, world, output_dir, timeout);
        info!(
            stage = %stage,
            program = %command.display_name(),
            args = ?command.display_args(),
            "Rendering map"
        );

        let exit = match self.runner.run(&command).await {
            Ok(exit) => exit,
            Err(e) => {
                error!(stage = %stage, error = %e, "Renderer did not complete");
                return StageOutcome::hard_failure(stage, started, e.to_string());
            }
        };

        let artifact = map_path(output_dir);
        match tokio::fs::metadata(&artifact).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                info!(
                    stage = %stage,
                    path = %artifact.display(),
                    bytes = meta.len(),
                    "Map rendered"
                );
                StageOutcome::success(stage, started)
                    .with_detail(format!("{} bytes at {}", meta.len(), artifact.display()))
            }
            Ok(_) => {
                warn!(stage = %stage, path = %artifact.display(), "Renderer produced an empty map");
                StageOutcome::soft_failure(stage, started, "renderer produced an empty map.jpg")
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    stage = %stage,
                    path = %artifact.display(),
                    code = ?exit.code,
                    "Renderer exited without producing a map"
                );
                StageOutcome::soft_failure(
                    stage,
                    started,
                    format!("renderer exited with code {:?} and no map.jpg", exit.code),
                )
            }
            Err(source) => {
                let e = StageError::ReadArtifact {
                    path: artifact,
                    source,
                };
                error!(stage = %stage, error = %e, "Could not inspect rendered map");
                StageOutcome::hard_failure(stage, started, e.to_string())
            }
        }
    }
}

/// Removes whatever is at `output_dir` and recreates it as an empty directory.
///
/// A missing path is not an error.
async fn clear_output(output_dir: &Path) -> Result<(), StageError> {
    let prepare = |source| StageError::Prepare {
        path: output_dir.to_path_buf(),
        source,
    };

    match tokio::fs::symlink_metadata(output_dir).await {
        Ok(meta) if meta.is_dir() => {
            tokio::fs::remove_dir_all(output_dir).await.map_err(prepare)?;
            info!(path = %output_dir.display(), "Deleted previous map output");
        }
        Ok(_) => {
            tokio::fs::remove_file(output_dir).await.map_err(prepare)?;
            info!(path = %output_dir.display(), "Deleted stray file at map output path");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %output_dir.display(), "No previous map found");
        }
        Err(e) => return Err(prepare(e)),
    }

    tokio::fs::create_dir_all(output_dir).await.map_err(prepare)?;
    debug!(path = %output_dir.display(), "Render output directory ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::testing::{
        assert_detail_contains, assert_stage_status, ScriptedProcessRunner, ScriptedRun,
    };
    use pretty_assertions::assert_eq;

    fn stager(runner: &Arc<ScriptedProcessRunner>) -> ArtifactStager {
        ArtifactStager::new(runner.clone())
    }

    #[test]
    fn test_render_command_is_an_argument_vector() {
        let command = render_command(
            Path::new("/opt/unmined/unmined-cli"),
            Path::new("/srv/my world"),
            Path::new("/srv/render"),
            Some(Duration::from_secs(30)),
        );

        assert_eq!(command.program, Path::new("/opt/unmined/unmined-cli"));
        assert_eq!(
            command.display_args(),
            vec![
                "image".to_string(),
                "render".to_string(),
                "--trim".to_string(),
                "--shadows=true".to_string(),
                "--world=/srv/my world".to_string(),
                format!("--output={}", Path::new("/srv/render").join("map.jpg").display()),
            ]
        );
        assert_eq!(command.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_missing_output_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("render");
        let scripted = ScriptedRun::WriteOutput(b"jpeg".to_vec());
        let runner = Arc::new(ScriptedProcessRunner::new().on_run(scripted));

        let outcome = stager(&runner)
            .stage_render(&dir.path().join("world"), Path::new("unmined-cli"), &output, None)
            .await;

        assert_stage_status(&outcome, StageStatus::Success);
        assert_eq!(runner.run_calls().len(), 1);
        assert_eq!(std::fs::read(output.join("map.jpg")).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_stale_output_is_removed_before_render() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("render");
        std::fs::create_dir_all(output.join("tiles")).unwrap();
        std::fs::write(output.join("map.jpg"), b"stale").unwrap();
        let runner = Arc::new(ScriptedProcessRunner::new().on_run(ScriptedRun::Exit(0)));

        let outcome = stager(&runner)
            .stage_render(&dir.path().join("world"), Path::new("unmined-cli"), &output, None)
            .await;

        assert_stage_status(&outcome, StageStatus::SoftFailure);
        assert!(output.is_dir());
        assert!(!output.join("map.jpg").exists());
        assert!(!output.join("tiles").exists());
    }

    #[tokio::test]
    async fn test_stray_file_at_output_path_is_replaced_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("render");
        std::fs::write(&output, b"not a directory").unwrap();
        let scripted = ScriptedRun::WriteOutput(b"jpeg".to_vec());
        let runner = Arc::new(ScriptedProcessRunner::new().on_run(scripted));

        let outcome = stager(&runner)
            .stage_render(&dir.path().join("world"), Path::new("unmined-cli"), &output, None)
            .await;

        assert_stage_status(&outcome, StageStatus::Success);
        assert!(output.is_dir());
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_artifact_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedProcessRunner::new().on_run(ScriptedRun::Exit(3)));

        let outcome = stager(&runner)
            .stage_render(
                &dir.path().join("world"),
                Path::new("unmined-cli"),
                &dir.path().join("out"),
                None,
            )
            .await;

        assert_stage_status(&outcome, StageStatus::SoftFailure);
        assert_detail_contains(&outcome, "Some(3)");
    }

    #[tokio::test]
    async fn test_empty_artifact_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            Arc::new(ScriptedProcessRunner::new().on_run(ScriptedRun::WriteOutput(Vec::new())));

        let outcome = stager(&runner)
            .stage_render(
                &dir.path().join("world"),
                Path::new("unmined-cli"),
                &dir.path().join("out"),
                None,
            )
            .await;

        assert_stage_status(&outcome, StageStatus::SoftFailure);
        assert_detail_contains(&outcome, "empty");
    }

    #[tokio::test]
    async fn test_spawn_failure_and_timeout_are_hard_failures() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedProcessRunner::new()
                .on_run(ScriptedRun::SpawnFailure)
                .on_run(ScriptedRun::TimedOut),
        );
        let stager = stager(&runner);
        let world = dir.path().join("world");
        let output = dir.path().join("out");

        let spawn = stager.stage_render(&world, Path::new("missing-cli"), &output, None).await;
        let timeout = stager
            .stage_render(&world, Path::new("slow-cli"), &output, Some(Duration::from_secs(1)))
            .await;

        assert_stage_status(&spawn, StageStatus::HardFailure);
        assert_detail_contains(&spawn, "missing-cli");
        assert_stage_status(&timeout, StageStatus::HardFailure);
        assert_detail_contains(&timeout, "timed out");
    }
}

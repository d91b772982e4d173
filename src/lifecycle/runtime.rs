//! Container runtime collaborator: docker compose plus git and HTTP probing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;

use crate::config::LifecycleConfig;
use crate::error::RuntimeError;

/// Narrow contract the lifecycle controller depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start the container set in the background.
    async fn start(&self) -> Result<(), RuntimeError>;

    /// Stop and remove the container set. Stopping a stopped set is a no-op.
    async fn stop(&self) -> Result<(), RuntimeError>;

    /// One readiness probe; any error counts as not healthy.
    async fn health_check(&self, url: &str) -> bool;

    /// Whether any container of the set is running.
    async fn is_running(&self) -> Result<bool, RuntimeError>;
}

/// `docker compose` over a git checkout of the platform.
pub struct ComposeRuntime {
    project_dir: PathBuf,
    repo_url: String,
    compose_file: String,
    http: Client,
}

impl std::fmt::Debug for ComposeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeRuntime")
            .field("project_dir", &self.project_dir)
            .field("compose_file", &self.compose_file)
            .finish_non_exhaustive()
    }
}

impl ComposeRuntime {
    pub fn new(config: &LifecycleConfig) -> Result<Self, RuntimeError> {
        let http = Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| RuntimeError::CommandFailed {
                command: "build readiness client".to_string(),
                stderr: e.to_string(),
            })?;

        Ok(Self {
            project_dir: config.project_dir.clone(),
            repo_url: config.repo_url.clone(),
            compose_file: config.compose_file.clone(),
            http,
        })
    }

    /// Clone the platform repository when the checkout is missing.
    async fn ensure_checkout(&self) -> Result<(), RuntimeError> {
        if self.project_dir.exists() {
            return Ok(());
        }

        tracing::info!(
            repo = %self.repo_url,
            dir = %self.project_dir.display(),
            "Cloning platform repository"
        );
        let dir = self.project_dir.to_string_lossy().to_string();
        let mut command = Command::new("git");
        command.args(["clone", "--depth", "1", &self.repo_url, &dir]);
        run_command(&mut command, None).await?;
        Ok(())
    }

    async fn compose(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let mut command = Command::new("docker");
        command.args(["compose", "-f", &self.compose_file]).args(args);
        run_command(&mut command, Some(&self.project_dir)).await
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn start(&self) -> Result<(), RuntimeError> {
        self.ensure_checkout().await?;
        self.compose(&["up", "-d"]).await?;
        tracing::info!(dir = %self.project_dir.display(), "Container set started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        if !self.project_dir.exists() {
            tracing::info!(
                dir = %self.project_dir.display(),
                "No platform checkout, nothing to stop"
            );
            return Ok(());
        }
        self.compose(&["down"]).await?;
        tracing::info!(dir = %self.project_dir.display(), "Container set stopped");
        Ok(())
    }

    async fn health_check(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url, status = response.status().as_u16(), "Readiness probe");
                response.status().is_success()
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Readiness probe failed");
                false
            }
        }
    }

    async fn is_running(&self) -> Result<bool, RuntimeError> {
        if !self.project_dir.exists() {
            return Ok(false);
        }
        let ids = self.compose(&["ps", "-q"]).await?;
        Ok(!ids.trim().is_empty())
    }
}

/// Run a command to completion; non-zero exit becomes `CommandFailed`.
async fn run_command(command: &mut Command, dir: Option<&Path>) -> Result<String, RuntimeError> {
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    let description = describe(command);

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::warn!(command = %description, stderr = %stderr, "Command failed");
        return Err(RuntimeError::CommandFailed {
            command: description,
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn describe(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_in(dir: &Path) -> ComposeRuntime {
        ComposeRuntime::new(&LifecycleConfig {
            project_dir: dir.join("platform"),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_stop_without_checkout_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime_in(dir.path());

        runtime.stop().await.unwrap();
        runtime.stop().await.unwrap();
        assert!(!runtime.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_unreachable_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime_in(dir.path());
        assert!(!runtime.health_check("http://localhost:65535/api/health").await);
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 3"]);

        let err = run_command(&mut command, None).await.unwrap_err();
        match err {
            RuntimeError::CommandFailed { command, stderr } => {
                assert_eq!(command, "sh -c echo boom >&2; exit 3");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::runtime::ContainerRuntime;
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;

/// Lifecycle state of the platform deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStatus {
    Down,
    Starting,
    Ready,
    Stopping,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Down => "down",
            LifecycleStatus::Starting => "starting",
            LifecycleStatus::Ready => "ready",
            LifecycleStatus::Stopping => "stopping",
        }
    }

    /// Valid transitions:
    /// - Down -> Starting (up)
    /// - Starting -> Ready (probe healthy)
    /// - Starting -> Down (startup timeout or failed start)
    /// - Starting -> Stopping, Ready -> Stopping (down)
    /// - Stopping -> Down (teardown finished)
    /// - Stopping -> Ready, Stopping -> Starting (teardown failed, previous state restored)
    pub fn can_transition(self, to: LifecycleStatus) -> bool {
        use LifecycleStatus::*;
        matches!(
            (self, to),
            (Down, Starting)
                | (Starting, Ready)
                | (Starting, Down)
                | (Starting, Stopping)
                | (Ready, Stopping)
                | (Stopping, Down)
                | (Stopping, Ready)
                | (Stopping, Starting)
        )
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the [`LifecycleStatus`] and gates seeding on platform readiness.
pub struct LifecycleController {
    runtime: Arc<dyn ContainerRuntime>,
    config: LifecycleConfig,
    health_url: String,
    status: watch::Sender<LifecycleStatus>,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("health_url", &self.health_url)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// New controller in the `Down` state. Use [`attach`](Self::attach) to
    /// pick up a deployment started by another process.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: LifecycleConfig,
        base_url: &str,
    ) -> Self {
        let health_url = format!("{}{}", base_url.trim_end_matches('/'), config.health_path);
        let (status, _) = watch::channel(LifecycleStatus::Down);
        Self {
            runtime,
            config,
            health_url,
            status,
        }
    }

    /// Current status, without side effects.
    pub fn status(&self) -> LifecycleStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.subscribe()
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Derive the status of an existing deployment from the runtime and a
    /// single readiness probe.
    pub async fn attach(&self) -> Result<LifecycleStatus, LifecycleError> {
        let status = if !self.runtime.is_running().await? {
            LifecycleStatus::Down
        } else if self.runtime.health_check(&self.health_url).await {
            LifecycleStatus::Ready
        } else {
            LifecycleStatus::Starting
        };
        self.status.send_replace(status);
        tracing::debug!(status = %status, "Attached to platform deployment");
        Ok(status)
    }

    /// Start the container set and block until the platform is ready.
    ///
    /// Already ready is a no-op; already starting only waits. On timeout the
    /// containers are torn down and the status returns to `Down`.
    pub async fn up(&self) -> Result<(), LifecycleError> {
        match self.status() {
            LifecycleStatus::Ready => {
                tracing::info!("Platform already ready");
                return Ok(());
            }
            LifecycleStatus::Starting => return self.await_ready().await,
            LifecycleStatus::Down => {}
            LifecycleStatus::Stopping => return Err(self.invalid("start")),
        }

        self.transition(LifecycleStatus::Starting)?;
        if let Err(e) = self.runtime.start().await {
            self.transition(LifecycleStatus::Down)?;
            return Err(LifecycleError::Runtime(e));
        }
        self.await_ready().await
    }

    /// Poll the readiness probe with capped exponential backoff until it
    /// succeeds or `max_wait` elapses.
    pub async fn await_ready(&self) -> Result<(), LifecycleError> {
        if self.status() != LifecycleStatus::Starting {
            return Err(self.invalid("wait for readiness"));
        }

        let started = Instant::now();
        let mut interval = self.config.initial_poll_interval;
        let mut polls = 0u32;

        loop {
            polls += 1;
            if self.runtime.health_check(&self.health_url).await {
                self.transition(LifecycleStatus::Ready)?;
                tracing::info!(
                    polls,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Platform is ready"
                );
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.max_wait {
                return Err(self.abort_startup(elapsed).await);
            }

            let delay = interval.min(self.config.max_wait - elapsed);
            tracing::debug!(
                polls,
                delay_ms = delay.as_millis() as u64,
                "Platform not ready yet"
            );
            tokio::time::sleep(delay).await;
            interval = interval
                .checked_mul(2)
                .unwrap_or(self.config.max_poll_interval)
                .min(self.config.max_poll_interval);
        }
    }

    /// Stop the container set. Idempotent: `Down` stays `Down`.
    pub async fn down(&self) -> Result<(), LifecycleError> {
        let previous = self.status();
        match previous {
            LifecycleStatus::Down => {
                tracing::info!("Platform already down");
                return Ok(());
            }
            LifecycleStatus::Stopping => return Err(self.invalid("stop")),
            LifecycleStatus::Starting | LifecycleStatus::Ready => {}
        }

        self.transition(LifecycleStatus::Stopping)?;
        if let Err(e) = self.runtime.stop().await {
            tracing::warn!(error = %e, "Teardown failed");
            self.transition(previous)?;
            return Err(LifecycleError::Teardown(e));
        }
        self.transition(LifecycleStatus::Down)
    }

    async fn abort_startup(&self, waited: Duration) -> LifecycleError {
        tracing::error!(
            waited_secs = waited.as_secs(),
            "Platform did not become ready, tearing down"
        );
        if let Err(e) = self.runtime.stop().await {
            tracing::warn!(error = %e, "Teardown after startup timeout failed");
        }
        if let Err(e) = self.transition(LifecycleStatus::Down) {
            return e;
        }
        LifecycleError::StartupTimeout { waited }
    }

    fn transition(&self, to: LifecycleStatus) -> Result<(), LifecycleError> {
        let from = self.status();
        if !from.can_transition(to) {
            return Err(LifecycleError::InvalidTransition {
                from: from.to_string(),
                action: format!("move to {to}"),
            });
        }
        self.status.send_replace(to);
        tracing::info!(from = %from, to = %to, "Lifecycle transition");
        Ok(())
    }

    fn invalid(&self, action: &str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            from: self.status().to_string(),
            action: action.to_string(),
        }
    }
}

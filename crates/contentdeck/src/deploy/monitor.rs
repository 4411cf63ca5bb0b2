use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::error::MonitorError;
use super::progress::{DeployEvent, DeployEventCallback, emit};
use super::source::{DeployStatusSource, SiteVersionSource};
use crate::queue::short_error_message;

/// Default poll ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default delay before the first poll.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2_000);

/// Default ceiling for the backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Default hard limit for a whole monitoring session.
pub const DEFAULT_MONITOR_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
    /// Give up after this many consecutive complete-but-unchanged polls.
    /// `None` keeps polling until the timeout or attempt ceiling.
    pub max_unchanged_polls: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            timeout: DEFAULT_MONITOR_TIMEOUT,
            max_unchanged_polls: None,
        }
    }
}

/// How a call to [`DeployCompletionMonitor::start_monitoring`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The live site now reports this version.
    Succeeded(String),
    Failed(MonitorError),
    /// [`DeployCompletionMonitor::stop_monitoring`] was called.
    Stopped,
    /// Another session was already active; nothing was done.
    AlreadyRunning,
}

impl MonitorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

enum Step<T> {
    Done(T),
    Stopped,
    TimedOut,
}

/// Polls a deploy until the new site version is live.
///
/// One session runs at a time. Each cycle sleeps with capped exponential
/// backoff, polls the status source, and once the deploy reports success
/// compares the live version marker with the one captured before the deploy.
/// The session is bounded by `timeout` (including a poll that never returns)
/// and by `max_attempts`. Only cycles whose polls succeed count as attempts,
/// so an unreachable status endpoint neither grows the delay nor uses up
/// attempts; the timeout alone bounds an outage.
pub struct DeployCompletionMonitor {
    status: Arc<dyn DeployStatusSource>,
    site: Arc<dyn SiteVersionSource>,
    config: MonitorConfig,
    session: Mutex<Option<CancellationToken>>,
}

impl DeployCompletionMonitor {
    pub fn new(
        status: Arc<dyn DeployStatusSource>,
        site: Arc<dyn SiteVersionSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            status,
            site,
            config,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Whether a session is active.
    pub fn is_monitoring(&self) -> bool {
        self.session().is_some()
    }

    /// Current site version, used to capture the marker before a deploy.
    pub async fn site_version(&self) -> Result<String, super::SourceError> {
        self.site.site_version().await
    }

    /// Cancel the active session, if any. Its pending sleep or poll is
    /// abandoned and it returns [`MonitorOutcome::Stopped`].
    pub fn stop_monitoring(&self) {
        if let Some(token) = self.session().as_ref() {
            tracing::debug!("Stopping deploy monitor");
            token.cancel();
        }
    }

    /// Monitor until the live version differs from `initial_version`.
    pub async fn start_monitoring(
        &self,
        initial_version: &str,
        on_event: Option<&DeployEventCallback>,
    ) -> MonitorOutcome {
        let token = {
            let mut session = self.session();
            if session.is_some() {
                return MonitorOutcome::AlreadyRunning;
            }
            let token = CancellationToken::new();
            *session = Some(token.clone());
            token
        };
        let _session = SessionGuard(&self.session);

        emit(
            on_event,
            DeployEvent::Started {
                initial_version: initial_version.to_string(),
            },
        );
        tracing::info!(initial_version, "Monitoring deploy");

        let outcome = self.run(initial_version, &token, on_event).await;
        match &outcome {
            MonitorOutcome::Succeeded(version) => {
                tracing::info!(version = %version, "Deploy is live");
                emit(
                    on_event,
                    DeployEvent::Succeeded {
                        version: version.clone(),
                    },
                );
            }
            MonitorOutcome::Failed(error) => {
                tracing::warn!(
                    error = %error,
                    unconfirmed = error.is_unconfirmed(),
                    "Deploy monitoring ended"
                );
                emit(
                    on_event,
                    DeployEvent::Failed {
                        error: error.to_string(),
                        unconfirmed: error.is_unconfirmed(),
                    },
                );
            }
            MonitorOutcome::Stopped => {
                tracing::info!("Deploy monitoring stopped");
                emit(on_event, DeployEvent::Stopped);
            }
            MonitorOutcome::AlreadyRunning => {}
        }
        outcome
    }

    async fn run(
        &self,
        initial_version: &str,
        token: &CancellationToken,
        on_event: Option<&DeployEventCallback>,
    ) -> MonitorOutcome {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let backoff = Backoff::new(self.config.initial_delay, self.config.max_delay);
        let timed_out = || MonitorOutcome::Failed(MonitorError::Timeout(self.config.timeout));

        let mut attempt: u32 = 0;
        let mut unchanged: u32 = 0;

        loop {
            if attempt >= self.config.max_attempts {
                return MonitorOutcome::Failed(MonitorError::MaxAttempts(attempt));
            }
            if started.elapsed() > self.config.timeout {
                return timed_out();
            }

            let delay = backoff.delay(attempt);
            emit(on_event, DeployEvent::Waiting { attempt, delay });
            match bounded(token, deadline, tokio::time::sleep(delay)).await {
                Step::Done(()) => {}
                Step::Stopped => return MonitorOutcome::Stopped,
                Step::TimedOut => return timed_out(),
            }

            let polled = match bounded(token, deadline, self.status.deploy_status()).await {
                Step::Done(polled) => polled,
                Step::Stopped => return MonitorOutcome::Stopped,
                Step::TimedOut => return timed_out(),
            };
            let current = attempt + 1;

            let status = match polled {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(attempt = current, error = %e, "Deploy status check failed");
                    emit(
                        on_event,
                        DeployEvent::PollFailed {
                            attempt: current,
                            error: short_error_message(&e),
                        },
                    );
                    continue;
                }
            };

            tracing::debug!(
                attempt = current,
                complete = status.complete,
                success = status.success,
                "Deploy status"
            );
            emit(
                on_event,
                DeployEvent::Progress {
                    attempt: current,
                    status: status.clone(),
                },
            );
            if token.is_cancelled() {
                return MonitorOutcome::Stopped;
            }

            if !status.complete {
                attempt = current;
                unchanged = 0;
                continue;
            }
            if !status.success {
                let message = status.error.unwrap_or_else(|| "unknown error".to_string());
                return MonitorOutcome::Failed(MonitorError::DeployFailed(message));
            }

            let version = match bounded(token, deadline, self.site.site_version()).await {
                Step::Done(Ok(version)) => version,
                Step::Done(Err(e)) => {
                    tracing::warn!(attempt = current, error = %e, "Site version check failed");
                    emit(
                        on_event,
                        DeployEvent::PollFailed {
                            attempt: current,
                            error: short_error_message(&e),
                        },
                    );
                    continue;
                }
                Step::Stopped => return MonitorOutcome::Stopped,
                Step::TimedOut => return timed_out(),
            };

            if version != initial_version {
                return MonitorOutcome::Succeeded(version);
            }

            attempt = current;
            unchanged += 1;
            emit(
                on_event,
                DeployEvent::VersionUnchanged {
                    attempt,
                    version: version.clone(),
                },
            );
            if let Some(limit) = self.config.max_unchanged_polls
                && unchanged >= limit
            {
                return MonitorOutcome::Failed(MonitorError::Unchanged {
                    version,
                    polls: unchanged,
                });
            }
        }
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the active session when monitoring returns or is dropped.
struct SessionGuard<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Run `fut` unless the session is cancelled or the deadline passes first.
async fn bounded<T>(
    token: &CancellationToken,
    deadline: Instant,
    fut: impl Future<Output = T>,
) -> Step<T> {
    tokio::select! {
        biased;

        _ = token.cancelled() => Step::Stopped,
        _ = tokio::time::sleep_until(deadline) => Step::TimedOut,
        value = fut => Step::Done(value),
    }
}

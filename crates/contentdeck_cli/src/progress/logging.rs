use contentdeck::DeployEvent;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: DeployEvent) {
        match event {
            DeployEvent::Started { initial_version } => {
                tracing::info!(initial_version = %initial_version, "Waiting for deploy");
            }

            DeployEvent::Waiting { attempt, delay } => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Next poll scheduled"
                );
            }

            DeployEvent::Progress { attempt, status } => {
                tracing::info!(
                    attempt,
                    complete = status.complete,
                    success = status.success,
                    "Deploy status"
                );
            }

            DeployEvent::PollFailed { attempt, error } => {
                tracing::warn!(attempt, error = %error, "Deploy status poll failed");
            }

            DeployEvent::VersionUnchanged { attempt, version } => {
                tracing::debug!(
                    attempt,
                    version = %version,
                    "Deploy complete, site not updated yet"
                );
            }

            DeployEvent::Succeeded { version } => {
                tracing::info!(version = %version, "Deploy is live");
            }

            DeployEvent::Failed { error, unconfirmed } => {
                if unconfirmed {
                    tracing::warn!(error = %error, "Deploy not confirmed, it may still go live");
                } else {
                    tracing::error!(error = %error, "Deploy failed");
                }
            }

            DeployEvent::Stopped => {
                tracing::info!("Deploy monitoring stopped");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}

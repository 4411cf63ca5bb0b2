//! Progress reporting for deploy monitoring.
//!
//! Two modes:
//! - Interactive mode (TTY): a spinner using indicatif
//! - Logging mode (non-TTY): structured logging using tracing

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use contentdeck::{DeployEvent, DeployEventCallback};

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    Interactive(InteractiveReporter),
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn handle(&self, event: DeployEvent) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a callback for the deploy monitor.
    pub fn as_callback(self: &Arc<Self>) -> DeployEventCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| reporter.handle(event))
    }

    /// Clear a spinner left running (interactive mode only).
    pub fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use contentdeck::deploy::DeployStatus;

    use super::*;

    fn all_events() -> Vec<DeployEvent> {
        vec![
            DeployEvent::Started {
                initial_version: String::new(),
            },
            DeployEvent::Waiting {
                attempt: 0,
                delay: Duration::from_secs(2),
            },
            DeployEvent::Progress {
                attempt: 1,
                status: DeployStatus::pending(),
            },
            DeployEvent::PollFailed {
                attempt: 2,
                error: "HTTP 502".to_string(),
            },
            DeployEvent::VersionUnchanged {
                attempt: 3,
                version: "v1".to_string(),
            },
            DeployEvent::Failed {
                error: "Deploy could not be confirmed within 180s".to_string(),
                unconfirmed: true,
            },
        ]
    }

    #[test]
    fn interactive_reporter_handles_a_full_session() {
        let reporter = Arc::new(ProgressReporter::Interactive(InteractiveReporter::new()));
        let callback = reporter.as_callback();
        for event in all_events() {
            callback(event);
        }
        // A second session after the first finished starts a fresh spinner.
        callback(DeployEvent::Started {
            initial_version: "v1".to_string(),
        });
        callback(DeployEvent::Succeeded {
            version: "v2".to_string(),
        });
        reporter.finish();
    }

    #[test]
    fn events_without_a_spinner_are_ignored() {
        let reporter = InteractiveReporter::new();
        reporter.handle(DeployEvent::Stopped);
        reporter.handle(DeployEvent::Waiting {
            attempt: 0,
            delay: Duration::from_secs(2),
        });
        reporter.finish();
    }

    #[test]
    fn logging_reporter_accepts_every_event() {
        let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
        let callback = reporter.as_callback();
        for event in all_events() {
            callback(event);
        }
        callback(DeployEvent::Stopped);
        reporter.finish();
    }
}

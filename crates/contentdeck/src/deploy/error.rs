use std::time::Duration;

use thiserror::Error;

use crate::http::HttpError;

/// Why a monitoring session ended without success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Deploy could not be confirmed within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Deploy could not be confirmed after {0} attempts")]
    MaxAttempts(u32),

    #[error("Deploy reported complete but the site version stayed at {version:?} for {polls} polls")]
    Unchanged { version: String, polls: u32 },

    #[error("Deploy failed: {0}")]
    DeployFailed(String),
}

impl MonitorError {
    /// The deploy may still succeed; monitoring just gave up on confirming it.
    pub fn is_unconfirmed(&self) -> bool {
        !matches!(self, Self::DeployFailed(_))
    }
}

/// Errors from a single status or version poll. Always transient.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid deploy status body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reported_failures_are_confirmed() {
        assert!(MonitorError::Timeout(Duration::from_secs(180)).is_unconfirmed());
        assert!(MonitorError::MaxAttempts(30).is_unconfirmed());
        assert!(
            MonitorError::Unchanged {
                version: "v1".into(),
                polls: 3
            }
            .is_unconfirmed()
        );
        assert!(!MonitorError::DeployFailed("boom".into()).is_unconfirmed());
    }

    #[test]
    fn messages_say_unconfirmed_not_failed() {
        let msg = MonitorError::Timeout(Duration::from_secs(180)).to_string();
        assert_eq!(msg, "Deploy could not be confirmed within 180s");
        assert!(!msg.contains("failed"));
    }
}

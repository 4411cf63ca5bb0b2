//! Deploy monitoring events.

use std::time::Duration;

use super::source::DeployStatus;

/// Events emitted while a deploy is being monitored.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DeployEvent {
    /// Monitoring began.
    Started {
        /// Site version seen before the deploy.
        initial_version: String,
    },

    /// Sleeping before the next poll.
    Waiting {
        /// Zero-based attempt the delay precedes.
        attempt: u32,
        delay: Duration,
    },

    /// The status endpoint answered.
    Progress { attempt: u32, status: DeployStatus },

    /// A poll failed; monitoring continues.
    PollFailed { attempt: u32, error: String },

    /// The deploy reported complete but the live version has not changed yet.
    VersionUnchanged { attempt: u32, version: String },

    /// The new version is live.
    Succeeded { version: String },

    /// Monitoring ended without success.
    Failed {
        error: String,
        /// True when the deploy may still succeed (timeout, attempt ceiling).
        unconfirmed: bool,
    },

    /// Monitoring was stopped by the caller.
    Stopped,
}

/// Callback invoked for each [`DeployEvent`].
pub type DeployEventCallback = Box<dyn Fn(DeployEvent) + Send + Sync>;

/// Helper to emit an event if a callback is present.
#[inline]
pub fn emit(on_event: Option<&DeployEventCallback>, event: DeployEvent) {
    if let Some(cb) = on_event {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[test]
    fn emit_calls_callback_when_present() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: DeployEventCallback = Box::new(move |event| sink.lock().unwrap().push(event));

        emit(Some(&callback), DeployEvent::Stopped);
        emit(None, DeployEvent::Stopped);

        assert_eq!(*seen.lock().unwrap(), vec![DeployEvent::Stopped]);
    }
}

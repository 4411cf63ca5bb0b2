use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::HttpHeaders;
use crate::http::header_get;

/// Last rate-limit budget reported by the remote.
///
/// Both fields come from the most recent response; a missing header clears
/// the field. The values are best-effort, not authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Requests left in the current window (`x-ratelimit-remaining`).
    pub remaining: Option<u64>,
    /// Window reset as epoch seconds (`x-ratelimit-reset`).
    pub reset_at_epoch_secs: Option<i64>,
}

impl RateLimitState {
    /// Replace the state with the values carried by a response.
    pub fn update_from_headers(&mut self, headers: &HttpHeaders) {
        self.remaining = header_get(headers, "x-ratelimit-remaining")
            .and_then(|v| v.trim().parse::<u64>().ok());
        self.reset_at_epoch_secs = header_get(headers, "x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok());
    }

    /// When the window resets, if known.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at_epoch_secs
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// How long to hold the next request.
    ///
    /// Only an exhausted budget (`remaining == 0`) with a reset still in the
    /// future requires a wait, which lasts until one second past the reset.
    pub fn wait_before_next(&self, now_ms: i64) -> Option<Duration> {
        if self.remaining != Some(0) {
            return None;
        }
        let reset_ms = self.reset_at_epoch_secs?.saturating_mul(1000);
        if now_ms >= reset_ms {
            return None;
        }
        Some(Duration::from_millis((reset_ms + 1000 - now_ms) as u64))
    }
}

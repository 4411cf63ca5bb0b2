//! Request queue error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::AuthError;
use crate::http::HttpError;

/// Errors delivered to the caller of a queued request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable bearer token.
    #[error("Authentication required: {0}")]
    Auth(#[from] AuthError),

    /// The budget is exhausted and the reset is further away than the queue
    /// is willing to wait.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Non-2xx response.
    #[error("GitHub API error: {status} {body}")]
    Status { status: u16, body: String },

    /// Network or connection error.
    #[error("Network error: {0}")]
    Transport(#[from] HttpError),

    /// The drain task is gone (runtime shutting down).
    #[error("Request queue closed")]
    Closed,
}

impl ApiError {
    /// The HTTP status, if the remote answered.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps response bodies
/// echoed into errors out of single-line logs.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

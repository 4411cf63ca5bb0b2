use thiserror::Error;

use crate::lock::LockError;
use crate::queue::ApiError;
use crate::storage::StorageError;

/// Errors from content operations.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The file changed remotely since it was read.
    #[error("{path} was modified by another user")]
    Conflict { path: String },

    #[error("{path} not found")]
    NotFound { path: String },

    /// The content failed validation; nothing was written.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ContentError {
    /// Whether retrying with fresh content could succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Lock(LockError::Conflict { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn decode(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Classify a failed API call on `path`.
    pub(crate) fn from_api(err: ApiError, path: &str) -> Self {
        match &err {
            ApiError::Status { status: 404, .. } => Self::NotFound {
                path: path.to_string(),
            },
            ApiError::Status { status: 409, .. } => Self::Conflict {
                path: path.to_string(),
            },
            ApiError::Status { status: 422, body } if body.contains("sha") => Self::Conflict {
                path: path.to_string(),
            },
            _ => Self::Api(err),
        }
    }
}

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> ApiError {
        ApiError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn classifies_conflicts_and_missing_files() {
        assert!(ContentError::from_api(status(404, ""), "a").is_not_found());
        assert!(ContentError::from_api(status(409, "does not match"), "a").is_conflict());
        assert!(
            ContentError::from_api(status(422, r#"{"message":"sha wasn't supplied"}"#), "a")
                .is_conflict()
        );
        assert!(matches!(
            ContentError::from_api(status(422, "invalid branch"), "a"),
            ContentError::Api(_)
        ));
        assert!(matches!(
            ContentError::from_api(ApiError::Closed, "a"),
            ContentError::Api(ApiError::Closed)
        ));
    }

    #[test]
    fn lock_conflicts_count_as_conflicts() {
        let err = ContentError::from(LockError::Conflict {
            expected: "a".into(),
            actual: "b".into(),
        });
        assert!(err.is_conflict());
    }

    #[test]
    fn validation_message_lists_every_problem() {
        let err = ContentError::Validation(vec!["missing id".into(), "missing title".into()]);
        assert_eq!(err.to_string(), "Validation failed: missing id; missing title");
    }
}

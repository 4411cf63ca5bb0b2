use thiserror::Error;

use crate::storage::StorageError;

/// Errors from the edit and deploy lock coordinators.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another client holds an unexpired lock on the resource.
    #[error("{resource} is locked by another client")]
    AlreadyLocked { resource: String },

    /// The remote content changed since it was read.
    #[error("Remote content changed: expected sha {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    /// The lock record could not be written.
    #[error("Lock storage error: {0}")]
    Storage(#[from] StorageError),

    /// The authoritative sha could not be fetched.
    #[error("Failed to fetch remote sha: {0}")]
    Remote(String),
}

impl LockError {
    #[inline]
    pub fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked { .. })
    }

    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{LockError, LockMetadata, RemoteShaSource};
use crate::clock::Clock;
use crate::storage::{self, SharedStorage};

/// Default storage key prefix for edit locks.
pub const DEFAULT_EDIT_KEY_PREFIX: &str = "concurrency_";

/// How long an edit lock blocks other editors.
pub const DEFAULT_EDIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct EditLockConfig {
    pub key_prefix: String,
    pub edit_timeout: Duration,
}

impl Default for EditLockConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_EDIT_KEY_PREFIX.to_string(),
            edit_timeout: DEFAULT_EDIT_TIMEOUT,
        }
    }
}

/// A "someone is editing this file" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditLock {
    #[serde(rename = "fileId")]
    pub resource_id: String,
    /// Epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub acquired_at_ms: i64,
    #[serde(default)]
    pub metadata: LockMetadata,
}

/// Per-resource advisory edit locks.
pub struct EditLockCoordinator {
    storage: Arc<dyn SharedStorage>,
    clock: Arc<dyn Clock>,
    remote: Arc<dyn RemoteShaSource>,
    config: EditLockConfig,
}

impl EditLockCoordinator {
    pub fn new(
        storage: Arc<dyn SharedStorage>,
        clock: Arc<dyn Clock>,
        remote: Arc<dyn RemoteShaSource>,
        config: EditLockConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            remote,
            config,
        }
    }

    /// Claim `resource_id` for editing.
    ///
    /// Fails with [`LockError::AlreadyLocked`] while another unexpired record
    /// exists. An expired record is overwritten.
    pub fn start_edit(
        &self,
        resource_id: &str,
        metadata: LockMetadata,
    ) -> Result<EditLock, LockError> {
        if let Some(existing) = self.current(resource_id) {
            tracing::debug!(
                resource = resource_id,
                holder = existing.metadata.holder(),
                "Edit lock held elsewhere"
            );
            return Err(LockError::AlreadyLocked {
                resource: resource_id.to_string(),
            });
        }

        let lock = EditLock {
            resource_id: resource_id.to_string(),
            acquired_at_ms: self.clock.now_ms(),
            metadata,
        };
        storage::write_json(self.storage.as_ref(), &self.key(resource_id), &lock)?;
        tracing::debug!(resource = resource_id, "Edit lock acquired");

        Ok(lock)
    }

    /// Release the edit lock. Safe to call when no lock exists.
    pub fn complete_edit(&self, resource_id: &str) {
        if let Err(e) = self.storage.remove(&self.key(resource_id)) {
            tracing::warn!(resource = resource_id, error = %e, "Failed to remove edit lock");
        }
    }

    /// Check that the remote still has `expected_sha` for the resource.
    pub async fn validate_sha(
        &self,
        resource_id: &str,
        expected_sha: &str,
    ) -> Result<(), LockError> {
        let actual = self.remote.remote_sha(resource_id).await?;
        if actual != expected_sha {
            return Err(LockError::Conflict {
                expected: expected_sha.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// The unexpired lock on `resource_id`, if any.
    pub fn current(&self, resource_id: &str) -> Option<EditLock> {
        let key = self.key(resource_id);
        let lock: EditLock = match storage::read_json(self.storage.as_ref(), &key) {
            Ok(lock) => lock?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring unreadable edit lock");
                return None;
            }
        };

        let age = self.clock.now_ms().saturating_sub(lock.acquired_at_ms);
        (age < self.config.edit_timeout.as_millis() as i64).then_some(lock)
    }

    /// Every unexpired edit lock in storage.
    pub fn active(&self) -> Vec<EditLock> {
        let keys = match self.storage.keys_with_prefix(&self.config.key_prefix) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list edit locks");
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|key| key.strip_prefix(&self.config.key_prefix))
            .filter_map(|id| self.current(id))
            .collect()
    }

    fn key(&self, resource_id: &str) -> String {
        format!("{}{}", self.config.key_prefix, resource_id)
    }
}

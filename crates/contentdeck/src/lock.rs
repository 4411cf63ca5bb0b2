//! Advisory locks over shared storage.
//!
//! Two coordinators share the same model: a JSON record under a prefixed key,
//! a timestamp inside the record, and readers that decide expiry on their own.
//! There is no compare-and-swap, so acquisition is check-then-write and two
//! clients racing inside the same instant can both win. The locks exist to
//! catch the common case of two editors opening the same file; the remote sha
//! check in [`EditLockCoordinator::validate_sha`] is what actually protects
//! content.

mod deploy;
mod edit;
mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use deploy::{
    DEFAULT_DEPLOY_KEY_PREFIX, DEFAULT_DEPLOY_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DeployLock,
    DeployLockConfig, DeployLockCoordinator,
};
pub use edit::{
    DEFAULT_EDIT_KEY_PREFIX, DEFAULT_EDIT_TIMEOUT, EditLock, EditLockConfig, EditLockCoordinator,
};
pub use error::LockError;

/// Who holds a lock.
///
/// Unknown fields written by other clients are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LockMetadata {
    /// Metadata for `user` with a fresh session id.
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            session: Some(uuid::Uuid::new_v4().to_string()),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Display name of the holder.
    pub fn holder(&self) -> &str {
        self.user.as_deref().unwrap_or("unknown")
    }
}

/// Source of the authoritative content hash for a resource.
#[async_trait]
pub trait RemoteShaSource: Send + Sync {
    async fn remote_sha(&self, resource_id: &str) -> Result<String, LockError>;
}

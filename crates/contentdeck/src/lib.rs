//! Contentdeck - content administration for a GitHub-hosted static site.
//!
//! Items (YAML) and articles (Markdown) live in a GitHub repository and are
//! edited through the contents API; the site is rebuilt by the host on every
//! commit. This library provides the coordination layer around that:
//!
//! - [`queue::RequestQueue`] serializes API calls and waits out an exhausted
//!   rate-limit budget.
//! - [`lock::EditLockCoordinator`] and [`lock::DeployLockCoordinator`] are
//!   advisory locks kept in [`storage::SharedStorage`] so several clients can
//!   see each other.
//! - [`deploy::DeployCompletionMonitor`] polls a deploy until the live site's
//!   version marker changes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use contentdeck::{
//!     ContentClient, EditLockCoordinator, ItemStore, LockMetadata, QueueConfig, RepoConfig,
//!     RequestQueue,
//! };
//!
//! let queue = RequestQueue::spawn(transport, tokens, clock.clone(), QueueConfig::default());
//! let client = ContentClient::new(queue, RepoConfig::default());
//! let remote = Arc::new(client.clone());
//! let locks = Arc::new(EditLockCoordinator::new(storage, clock, remote, Default::default()));
//! let items = ItemStore::new(client, locks);
//!
//! items.load().await?;
//! items.save(fields, LockMetadata::for_user("ada")).await?;
//! ```

pub mod articles;
pub mod auth;
pub mod clock;
pub mod content;
pub mod deploy;
pub mod http;
pub mod items;
pub mod lock;
pub mod media;
pub mod publish;
pub mod queue;
pub mod storage;

pub use articles::{Article, ArticleStore};
pub use auth::{AuthError, StaticToken, StoredToken, TokenProvider};
pub use clock::{Clock, SystemClock};
pub use content::{ContentClient, ContentError, RepoConfig};
pub use deploy::{
    DeployCompletionMonitor, DeployEvent, DeployEventCallback, MonitorConfig, MonitorError,
    MonitorOutcome,
};
pub use http::{HttpTransport, reqwest_transport::ReqwestTransport};
pub use items::{Item, ItemStore};
pub use lock::{DeployLockCoordinator, EditLockCoordinator, LockError, LockMetadata};
pub use media::{MediaFile, MediaLibrary, Upload};
pub use publish::{PublishError, Publisher};
pub use queue::{ApiError, QueueConfig, RateLimitState, RequestOptions, RequestQueue};
pub use storage::{FileStorage, MemoryStorage, SharedStorage, StorageError};

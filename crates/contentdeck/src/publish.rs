//! Save-then-deploy workflow.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::content::ContentError;
use crate::deploy::{DeployCompletionMonitor, DeployEventCallback, MonitorOutcome, SourceError};
use crate::lock::{DeployLockCoordinator, LockError, LockMetadata};

/// Deploy lock id shared by every client publishing the site.
pub const SITE_DEPLOY_LOCK: &str = "site";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Content(#[from] ContentError),

    /// The live version could not be read before saving.
    #[error("Failed to read site version: {0}")]
    SiteVersion(#[from] SourceError),
}

/// Runs deploy monitoring under the site deploy lock.
pub struct Publisher {
    locks: Arc<DeployLockCoordinator>,
    monitor: Arc<DeployCompletionMonitor>,
}

impl Publisher {
    pub fn new(locks: Arc<DeployLockCoordinator>, monitor: Arc<DeployCompletionMonitor>) -> Self {
        Self { locks, monitor }
    }

    pub fn monitor(&self) -> &Arc<DeployCompletionMonitor> {
        &self.monitor
    }

    /// Monitor the deploy triggered by a commit.
    ///
    /// Fails with [`LockError::AlreadyLocked`] before monitoring if another
    /// client holds the deploy lock. The lock is released however monitoring
    /// ends, including when this future is dropped.
    pub async fn deploy(
        &self,
        initial_version: &str,
        metadata: LockMetadata,
        on_event: Option<&DeployEventCallback>,
    ) -> Result<MonitorOutcome, PublishError> {
        let _release = self.hold_site_lock(metadata)?;
        Ok(self.monitor.start_monitoring(initial_version, on_event).await)
    }

    /// Capture the live version, run `save`, then monitor the deploy.
    ///
    /// The deploy lock is taken before `save` runs, so a commit that lands is
    /// always followed by monitoring and its result is never discarded.
    pub async fn save_and_deploy<T, F>(
        &self,
        save: F,
        metadata: LockMetadata,
        on_event: Option<&DeployEventCallback>,
    ) -> Result<(T, MonitorOutcome), PublishError>
    where
        F: Future<Output = Result<T, ContentError>>,
    {
        let _release = self.hold_site_lock(metadata)?;

        let initial_version = self.monitor.site_version().await?;
        tracing::debug!(initial_version = %initial_version, "Captured site version");

        let saved = save.await?;
        let outcome = self.monitor.start_monitoring(&initial_version, on_event).await;
        Ok((saved, outcome))
    }

    fn hold_site_lock(&self, metadata: LockMetadata) -> Result<ReleaseOnDrop<'_>, LockError> {
        self.locks.acquire_lock(SITE_DEPLOY_LOCK, metadata)?;
        Ok(ReleaseOnDrop {
            locks: &self.locks,
            id: SITE_DEPLOY_LOCK,
        })
    }

    /// Stop an in-flight deploy monitor.
    pub fn stop(&self) {
        self.monitor.stop_monitoring();
    }
}

struct ReleaseOnDrop<'a> {
    locks: &'a DeployLockCoordinator,
    id: &'a str,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.locks.release_lock(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::clock::ManualClock;
    use crate::deploy::{DeployStatus, DeployStatusSource, MonitorConfig, SiteVersionSource};
    use crate::lock::DeployLockConfig;
    use crate::storage::{MemoryStorage, SharedStorage};

    struct Done;

    #[async_trait]
    impl DeployStatusSource for Done {
        async fn deploy_status(&self) -> Result<DeployStatus, SourceError> {
            Ok(DeployStatus::succeeded())
        }
    }

    /// Returns versions in order, repeating the last one.
    struct Versions(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl SiteVersionSource for Versions {
        async fn site_version(&self) -> Result<String, SourceError> {
            let mut versions = self.0.lock().unwrap();
            let v = if versions.len() > 1 {
                versions.remove(0)
            } else {
                versions[0]
            };
            Ok(v.to_string())
        }
    }

    fn publisher(storage: &MemoryStorage, versions: Vec<&'static str>) -> Publisher {
        let locks = Arc::new(DeployLockCoordinator::new(
            Arc::new(storage.clone()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            DeployLockConfig::default(),
        ));
        let monitor = Arc::new(DeployCompletionMonitor::new(
            Arc::new(Done),
            Arc::new(Versions(Mutex::new(versions))),
            MonitorConfig::default(),
        ));
        Publisher::new(locks, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_releases_lock_after_monitoring() {
        let storage = MemoryStorage::new();
        let publisher = publisher(&storage, vec!["v2"]);

        let outcome = publisher
            .deploy("v1", LockMetadata::for_user("ada"), None)
            .await
            .expect("deploy");

        assert_eq!(outcome, MonitorOutcome::Succeeded("v2".to_string()));
        assert!(storage.keys_with_prefix("deploy_lock_").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_fails_fast_when_locked_elsewhere() {
        let storage = MemoryStorage::new();
        let other = publisher(&storage, vec!["v1"]);
        other
            .locks
            .acquire_lock(SITE_DEPLOY_LOCK, LockMetadata::for_user("bob"))
            .unwrap();

        let publisher = publisher(&storage, vec!["v2"]);
        let err = publisher
            .deploy("v1", LockMetadata::for_user("ada"), None)
            .await
            .expect_err("locked");
        assert!(matches!(err, PublishError::Lock(ref e) if e.is_already_locked()));
        assert!(!publisher.monitor().is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn save_and_deploy_captures_version_before_saving() {
        let storage = MemoryStorage::new();
        let publisher = publisher(&storage, vec!["v1", "v1", "v2"]);

        let (saved, outcome) = publisher
            .save_and_deploy(async { Ok::<_, ContentError>("sha") }, LockMetadata::default(), None)
            .await
            .expect("published");

        assert_eq!(saved, "sha");
        assert_eq!(outcome, MonitorOutcome::Succeeded("v2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_skips_deploy() {
        let storage = MemoryStorage::new();
        let publisher = publisher(&storage, vec!["v1"]);

        let err = publisher
            .save_and_deploy(
                async { Err::<(), _>(ContentError::Validation(vec!["bad".into()])) },
                LockMetadata::default(),
                None,
            )
            .await
            .expect_err("save failed");

        assert!(matches!(err, PublishError::Content(ContentError::Validation(_))));
        assert!(storage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn committed_save_survives_a_competing_deployer() {
        let storage = MemoryStorage::new();
        let rival = publisher(&storage, vec!["v1"]);
        let publisher = publisher(&storage, vec!["v1", "v2"]);

        let (saved, outcome) = publisher
            .save_and_deploy(
                async {
                    let taken = rival
                        .locks
                        .acquire_lock(SITE_DEPLOY_LOCK, LockMetadata::for_user("bob"));
                    assert!(matches!(taken, Err(ref e) if e.is_already_locked()));
                    Ok::<_, ContentError>("new-sha")
                },
                LockMetadata::for_user("ada"),
                None,
            )
            .await
            .expect("published");

        assert_eq!(saved, "new-sha");
        assert_eq!(outcome, MonitorOutcome::Succeeded("v2".to_string()));
        assert!(storage.keys_with_prefix("deploy_lock_").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn save_is_skipped_while_another_client_deploys() {
        let storage = MemoryStorage::new();
        let rival = publisher(&storage, vec!["v1"]);
        rival
            .locks
            .acquire_lock(SITE_DEPLOY_LOCK, LockMetadata::for_user("bob"))
            .unwrap();

        let publisher = publisher(&storage, vec!["v1"]);
        let saved = std::sync::atomic::AtomicBool::new(false);
        let err = publisher
            .save_and_deploy(
                async {
                    saved.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, ContentError>(())
                },
                LockMetadata::for_user("ada"),
                None,
            )
            .await
            .expect_err("locked");

        assert!(matches!(err, PublishError::Lock(ref e) if e.is_already_locked()));
        assert!(!saved.load(std::sync::atomic::Ordering::SeqCst));
        assert!(rival.locks.holds(SITE_DEPLOY_LOCK));
    }
}

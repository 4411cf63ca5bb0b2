use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::{LockError, LockMetadata};
use crate::clock::Clock;
use crate::storage::{self, SharedStorage};

/// Default storage key prefix for deploy locks.
pub const DEFAULT_DEPLOY_KEY_PREFIX: &str = "deploy_lock_";

/// A lock whose heartbeat is older than this is stale.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// How often a held lock's heartbeat is refreshed.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DeployLockConfig {
    pub key_prefix: String,
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for DeployLockConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_DEPLOY_KEY_PREFIX.to_string(),
            timeout: DEFAULT_DEPLOY_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// A "deploy in progress" record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployLock {
    pub id: String,
    /// Epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub acquired_at_ms: i64,
    #[serde(default)]
    pub metadata: LockMetadata,
    /// Epoch milliseconds of the last heartbeat.
    #[serde(rename = "heartbeat")]
    pub last_heartbeat_ms: i64,
}

impl DeployLock {
    /// Whether `other` is the record written by this acquisition.
    fn same_holder(&self, other: &DeployLock) -> bool {
        self.acquired_at_ms == other.acquired_at_ms && self.metadata == other.metadata
    }
}

/// A lock this coordinator acquired, with its heartbeat task.
struct Held {
    lock: DeployLock,
    heartbeat: JoinHandle<()>,
}

/// Advisory deploy locks kept alive by a heartbeat.
///
/// Each held lock has its own heartbeat task. Dropping the coordinator stops
/// every heartbeat but leaves the records behind; they go stale after
/// `timeout`, exactly as if the process had died.
///
/// A holder that finds another client's record under its key (because it
/// was suspended past `timeout` and the lock was taken over) stops
/// heartbeating and leaves that record alone on release.
pub struct DeployLockCoordinator {
    storage: Arc<dyn SharedStorage>,
    clock: Arc<dyn Clock>,
    config: DeployLockConfig,
    heartbeats: Mutex<HashMap<String, Held>>,
}

impl DeployLockCoordinator {
    pub fn new(
        storage: Arc<dyn SharedStorage>,
        clock: Arc<dyn Clock>,
        config: DeployLockConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            config,
            heartbeats: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock and start its heartbeat.
    ///
    /// Must be called from within a tokio runtime.
    pub fn acquire_lock(&self, id: &str, metadata: LockMetadata) -> Result<DeployLock, LockError> {
        if self.is_locked(id) {
            return Err(LockError::AlreadyLocked {
                resource: id.to_string(),
            });
        }

        let now = self.clock.now_ms();
        let lock = DeployLock {
            id: id.to_string(),
            acquired_at_ms: now,
            metadata,
            last_heartbeat_ms: now,
        };
        let key = self.key(id);
        storage::write_json(self.storage.as_ref(), &key, &lock)?;

        let handle = tokio::spawn(heartbeat(
            Arc::clone(&self.storage),
            Arc::clone(&self.clock),
            key,
            lock.clone(),
            self.config.heartbeat_interval,
        ));
        let held = Held {
            lock: lock.clone(),
            heartbeat: handle,
        };
        if let Some(previous) = self.heartbeats().insert(id.to_string(), held) {
            previous.heartbeat.abort();
        }

        tracing::info!(lock = id, holder = lock.metadata.holder(), "Deploy lock acquired");
        Ok(lock)
    }

    /// Stop the heartbeat and remove the record, unless another client has
    /// since taken the lock over.
    pub fn release_lock(&self, id: &str) {
        let key = self.key(id);
        if let Some(held) = self.heartbeats().remove(id) {
            held.heartbeat.abort();
            if let Ok(Some(stored)) = storage::read_json::<DeployLock>(self.storage.as_ref(), &key)
                && !held.lock.same_holder(&stored)
            {
                tracing::warn!(
                    lock = id,
                    holder = stored.metadata.holder(),
                    "Deploy lock was taken over; leaving it in place"
                );
                return;
            }
        }
        if let Err(e) = self.storage.remove(&key) {
            tracing::warn!(lock = id, error = %e, "Failed to remove deploy lock");
        }
        tracing::info!(lock = id, "Deploy lock released");
    }

    /// Whether a live record exists. Stale records are left in place.
    pub fn is_locked(&self, id: &str) -> bool {
        self.current(id).is_some()
    }

    /// The live lock record, if any.
    pub fn current(&self, id: &str) -> Option<DeployLock> {
        let key = self.key(id);
        let lock: DeployLock = match storage::read_json(self.storage.as_ref(), &key) {
            Ok(lock) => lock?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring unreadable deploy lock");
                return None;
            }
        };

        let age = self.clock.now_ms().saturating_sub(lock.last_heartbeat_ms);
        (age <= self.config.timeout.as_millis() as i64).then_some(lock)
    }

    /// Whether this coordinator is heartbeating `id`.
    pub fn holds(&self, id: &str) -> bool {
        self.heartbeats()
            .get(id)
            .is_some_and(|held| !held.heartbeat.is_finished())
    }

    fn heartbeats(&self) -> std::sync::MutexGuard<'_, HashMap<String, Held>> {
        self.heartbeats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }
}

impl Drop for DeployLockCoordinator {
    fn drop(&mut self) {
        for (_, held) in self.heartbeats().drain() {
            held.heartbeat.abort();
        }
    }
}

async fn heartbeat(
    storage: Arc<dyn SharedStorage>,
    clock: Arc<dyn Clock>,
    key: String,
    mut lock: DeployLock,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if let Ok(Some(stored)) = storage::read_json::<DeployLock>(storage.as_ref(), &key)
            && !lock.same_holder(&stored)
        {
            tracing::warn!(
                key = %key,
                holder = stored.metadata.holder(),
                "Deploy lock taken over by another client; stopping heartbeat"
            );
            return;
        }
        lock.last_heartbeat_ms = clock.now_ms();
        match storage::write_json(storage.as_ref(), &key, &lock) {
            Ok(()) => tracing::trace!(key = %key, "Deploy lock heartbeat"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Deploy lock heartbeat failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::{ManualClock, TokioClock};
    use crate::storage::MemoryStorage;

    const START_MS: i64 = 1_700_000_000_000;

    fn coordinator(storage: &MemoryStorage, clock: Arc<dyn Clock>) -> DeployLockCoordinator {
        DeployLockCoordinator::new(Arc::new(storage.clone()), clock, DeployLockConfig::default())
    }

    fn stored(storage: &MemoryStorage, id: &str) -> Option<DeployLock> {
        storage::read_json(storage, &format!("deploy_lock_{id}")).expect("readable")
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_fails_while_live() {
        let storage = MemoryStorage::new();
        let clock = Arc::new(ManualClock::new(START_MS));
        let a = coordinator(&storage, clock.clone());
        let b = coordinator(&storage, clock.clone());

        a.acquire_lock("site", LockMetadata::for_user("ada")).expect("acquire");
        assert!(b.is_locked("site"));
        assert!(a.holds("site"));
        assert!(!b.holds("site"));

        let err = b
            .acquire_lock("site", LockMetadata::for_user("bob"))
            .expect_err("held by a");
        assert!(err.is_already_locked());

        a.release_lock("site");
        assert!(!b.is_locked("site"));
        b.acquire_lock("site", LockMetadata::for_user("bob")).expect("free");
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_record_until_release() {
        let storage = MemoryStorage::new();
        let locks = coordinator(&storage, Arc::new(TokioClock::new(START_MS)));

        locks.acquire_lock("site", LockMetadata::default()).expect("acquire");
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(stored(&storage, "site").unwrap().last_heartbeat_ms, START_MS + 5_000);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let lock = stored(&storage, "site").unwrap();
        assert_eq!(lock.last_heartbeat_ms, START_MS + 10_000);
        assert_eq!(lock.acquired_at_ms, START_MS);

        locks.release_lock("site");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(stored(&storage, "site").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_holder_goes_stale_but_record_remains() {
        let storage = MemoryStorage::new();
        let clock = Arc::new(ManualClock::new(START_MS));

        let holder = coordinator(&storage, clock.clone());
        holder.acquire_lock("site", LockMetadata::default()).expect("acquire");
        drop(holder);

        let other = coordinator(&storage, clock.clone());
        clock.advance(DEFAULT_DEPLOY_TIMEOUT);
        assert!(other.is_locked("site"), "exactly at the timeout is still live");

        clock.advance(Duration::from_millis(1));
        assert!(!other.is_locked("site"));
        assert!(stored(&storage, "site").is_some(), "checking does not delete");

        let lock = other
            .acquire_lock("site", LockMetadata::for_user("bob"))
            .expect("stale lock is overwritten");
        assert_eq!(stored(&storage, "site"), Some(lock));
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_holder_yields_to_the_client_that_took_over() {
        let storage = MemoryStorage::new();
        let clock = Arc::new(ManualClock::new(START_MS));
        let sleeper = coordinator(&storage, clock.clone());
        let rival = coordinator(&storage, clock.clone());

        sleeper
            .acquire_lock("site", LockMetadata::for_user("ada"))
            .expect("acquire");
        // The sleeper's heartbeats stall while the clock moves past the timeout.
        clock.advance(DEFAULT_DEPLOY_TIMEOUT + Duration::from_secs(1));
        let taken = rival
            .acquire_lock("site", LockMetadata::for_user("bob"))
            .expect("stale lock taken over");

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!sleeper.holds("site"));
        let stored_lock = stored(&storage, "site").unwrap();
        assert_eq!(stored_lock.metadata.holder(), "bob");
        assert!(stored_lock.last_heartbeat_ms >= taken.last_heartbeat_ms);

        sleeper.release_lock("site");
        assert_eq!(stored(&storage, "site").unwrap().metadata.holder(), "bob");
        assert!(rival.is_locked("site"));
    }

    #[tokio::test(start_paused = true)]
    async fn locks_are_independent_per_id() {
        let storage = MemoryStorage::new();
        let locks = coordinator(&storage, Arc::new(ManualClock::new(START_MS)));

        locks.acquire_lock("site", LockMetadata::default()).unwrap();
        locks.acquire_lock("preview", LockMetadata::default()).unwrap();
        locks.release_lock("site");

        assert!(!locks.is_locked("site"));
        assert!(locks.is_locked("preview"));
        assert!(locks.holds("preview"));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_write_fails_acquisition_without_heartbeat() {
        let storage = MemoryStorage::new();
        storage.reject_writes(true);
        let locks = coordinator(&storage, Arc::new(ManualClock::new(START_MS)));

        let err = locks
            .acquire_lock("site", LockMetadata::default())
            .expect_err("storage full");
        assert!(matches!(err, LockError::Storage(_)));
        assert!(!locks.holds("site"));
    }
}

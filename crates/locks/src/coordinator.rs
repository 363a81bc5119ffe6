//! Keyed lock coordinator.
//!
//! Guards per-user conversation memory and per-collection ingestion
//! state. Exclusive mode for writers, shared mode for readers; the
//! underlying `tokio::sync::RwLock` is fair, so a queued writer blocks
//! later readers and staleness stays bounded. Acquisition is always
//! timeout-bounded — a busy lock produces an error, never an unbounded
//! wait. Guards release on drop, including on task cancellation.

use chrono::Utc;
use clarion_config::LockConfig;
use clarion_core::{EngineEvent, EventBus, LockError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;
use tracing::debug;

/// What a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    UserMemory,
    Collection,
}

impl ResourceKind {
    fn name(&self) -> &'static str {
        match self {
            ResourceKind::UserMemory => "user_memory",
            ResourceKind::Collection => "collection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared read access.
    Shared,
    /// Exclusive write access.
    Exclusive,
}

/// Held lock. Releases on drop.
pub struct LockGuard {
    _guard: GuardInner,
    resource: String,
}

enum GuardInner {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn mode_name(&self) -> &'static str {
        match self._guard {
            GuardInner::Shared(_) => "shared",
            GuardInner::Exclusive(_) => "exclusive",
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.resource)
            .field("mode", &self.mode_name())
            .finish()
    }
}

pub struct LockCoordinator {
    entries: Mutex<HashMap<(ResourceKind, String), Arc<RwLock<()>>>>,
    config: LockConfig,
    bus: Arc<EventBus>,
}

impl LockCoordinator {
    pub fn new(config: LockConfig, bus: Arc<EventBus>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            bus,
        }
    }

    /// Acquire a lock with the default timeout.
    pub async fn acquire(
        &self,
        kind: ResourceKind,
        id: &str,
        mode: LockMode,
    ) -> Result<LockGuard, LockError> {
        self.acquire_with_timeout(
            kind,
            id,
            mode,
            Duration::from_millis(self.config.default_timeout_ms),
        )
        .await
    }

    /// Acquire a lock, waiting at most `timeout`.
    pub async fn acquire_with_timeout(
        &self,
        kind: ResourceKind,
        id: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        let resource = format!("{}:{}", kind.name(), id);
        let entry = self.entry(kind, id);
        let started = Instant::now();

        let acquired = match mode {
            LockMode::Shared => tokio::time::timeout(timeout, entry.read_owned())
                .await
                .map(GuardInner::Shared),
            LockMode::Exclusive => tokio::time::timeout(timeout, entry.write_owned())
                .await
                .map(GuardInner::Exclusive),
        };

        match acquired {
            Ok(guard) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                if waited_ms > 0 {
                    self.bus.publish(EngineEvent::LockContended {
                        resource: resource.clone(),
                        waited_ms,
                        timestamp: Utc::now(),
                    });
                }
                debug!(resource = %resource, waited_ms, "lock acquired");
                Ok(LockGuard {
                    _guard: guard,
                    resource,
                })
            }
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                self.bus.publish(EngineEvent::LockTimeout {
                    resource: resource.clone(),
                    timeout_ms,
                    timestamp: Utc::now(),
                });
                Err(LockError::Timeout {
                    resource,
                    timeout_ms,
                })
            }
        }
    }

    /// Run `f` while holding the user's memory lock.
    ///
    /// A timeout is returned to the caller as a recoverable error; `f`
    /// is not run. The lock is released when `f` completes or when the
    /// surrounding task is cancelled.
    pub async fn with_user_lock<T, F, Fut>(
        &self,
        user_id: &str,
        mode: LockMode,
        timeout: Duration,
        f: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self
            .acquire_with_timeout(ResourceKind::UserMemory, user_id, mode, timeout)
            .await?;
        Ok(f().await)
    }

    /// Run `f` while holding the collection's lock.
    pub async fn with_collection_lock<T, F, Fut>(
        &self,
        collection: &str,
        mode: LockMode,
        timeout: Duration,
        f: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self
            .acquire_with_timeout(ResourceKind::Collection, collection, mode, timeout)
            .await?;
        Ok(f().await)
    }

    fn entry(&self, kind: ResourceKind, id: &str) -> Arc<RwLock<()>> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Entries with no holders or waiters are dropped opportunistically.
        entries.retain(|_, lock| Arc::strong_count(lock) > 1);
        entries
            .entry((kind, id.to_string()))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Number of live lock entries, for inspection.
    pub fn entry_count(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> LockCoordinator {
        LockCoordinator::new(
            LockConfig {
                default_timeout_ms: 5000,
            },
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn exclusive_locks_are_mutually_exclusive() {
        let coordinator = coordinator();
        let held = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();

        let err = coordinator
            .acquire_with_timeout(
                ResourceKind::UserMemory,
                "u1",
                LockMode::Exclusive,
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));

        drop(held);
        // Released: the next acquisition succeeds immediately.
        coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn guard_debug_names_the_resource_and_mode() {
        let coordinator = coordinator();
        let guard = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Shared)
            .await
            .unwrap();
        let rendered = format!("{guard:?}");
        assert!(rendered.contains("user_memory:u1"));
        assert!(rendered.contains("shared"));
    }

    #[tokio::test]
    async fn shared_readers_coexist() {
        let coordinator = coordinator();
        let r1 = coordinator
            .acquire(ResourceKind::Collection, "kb", LockMode::Shared)
            .await
            .unwrap();
        let r2 = coordinator
            .acquire(ResourceKind::Collection, "kb", LockMode::Shared)
            .await
            .unwrap();
        assert_eq!(r1.resource(), r2.resource());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_excludes_readers() {
        let coordinator = coordinator();
        let _writer = coordinator
            .acquire(ResourceKind::Collection, "kb", LockMode::Exclusive)
            .await
            .unwrap();

        let err = coordinator
            .acquire_with_timeout(
                ResourceKind::Collection,
                "kb",
                LockMode::Shared,
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn distinct_resources_do_not_contend() {
        let coordinator = coordinator();
        let _a = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();
        // Same id, different kind: independent lock.
        let _b = coordinator
            .acquire(ResourceKind::Collection, "u1", LockMode::Exclusive)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_does_not_block_later_acquisitions() {
        let coordinator = Arc::new(coordinator());
        let held = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();

        let waiter = coordinator.clone();
        let timed_out = tokio::spawn(async move {
            waiter
                .acquire_with_timeout(
                    ResourceKind::UserMemory,
                    "u1",
                    LockMode::Exclusive,
                    Duration::from_millis(10),
                )
                .await
        });
        assert!(timed_out.await.unwrap().is_err());

        drop(held);
        coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_publishes_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let coordinator = LockCoordinator::new(
            LockConfig {
                default_timeout_ms: 10,
            },
            bus,
        );

        let _held = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();
        let _ = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await;

        let mut saw_timeout = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), EngineEvent::LockTimeout { .. }) {
                saw_timeout = true;
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test]
    async fn scoped_helper_runs_under_the_lock() {
        let coordinator = coordinator();
        let value = coordinator
            .with_user_lock("u1", LockMode::Exclusive, Duration::from_millis(100), || async {
                41 + 1
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        // Lock released afterwards.
        coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_helper_times_out_without_running() {
        let coordinator = coordinator();
        let _held = coordinator
            .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
            .await
            .unwrap();

        let ran = std::sync::atomic::AtomicBool::new(false);
        let result = coordinator
            .with_user_lock("u1", LockMode::Exclusive, Duration::from_millis(10), || {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                async { () }
            })
            .await;
        assert!(result.is_err());
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn idle_entries_are_purged() {
        let coordinator = coordinator();
        {
            let _guard = coordinator
                .acquire(ResourceKind::UserMemory, "u1", LockMode::Exclusive)
                .await
                .unwrap();
        }
        // Touch another key; the idle u1 entry is purged on the way.
        let _other = coordinator
            .acquire(ResourceKind::UserMemory, "u2", LockMode::Exclusive)
            .await
            .unwrap();
        assert_eq!(coordinator.entry_count(), 1);
    }
}

//! Periodic flush driver for pending pushes.
//!
//! Connectivity transitions are the primary trigger (see
//! `LocalFirstRepository::attach_connectivity`); the scheduler is a safety
//! net that keeps draining the queue while the app stays in the foreground.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::repository::LocalFirstRepository;
use crate::sync::Syncable;

/// Foreground flush cadence in seconds.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to each cycle.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Handle to a running periodic flush task. Aborts on drop.
pub struct SyncScheduler {
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn spawn<E: Syncable>(repository: Arc<LocalFirstRepository<E>>) -> Self {
        Self::spawn_with_interval(
            repository,
            Duration::from_secs(SYNC_FOREGROUND_INTERVAL_SECS),
        )
    }

    pub fn spawn_with_interval<E: Syncable>(
        repository: Arc<LocalFirstRepository<E>>,
        interval: Duration,
    ) -> Self {
        // Jitter never exceeds the interval itself, so short test cadences
        // stay short.
        let jitter_cap = SYNC_INTERVAL_JITTER_SECS.min(interval.as_secs());
        let handle = tokio::spawn(async move {
            loop {
                let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
                tokio::time::sleep(interval + Duration::from_secs(jitter)).await;
                if let Err(err) = repository.flush_pending().await {
                    warn!("Scheduled flush failed: {}", err);
                }
            }
        });
        Self { handle }
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CreditCard;
    use crate::events::EventBus;
    use crate::network::{NetworkMonitor, NetworkStatus};
    use crate::remote::RemoteApi;
    use crate::settings::SyncSettings;
    use crate::store::{EntityStore, MemoryStore};
    use crate::sync::SyncState;
    use crate::testsupport::{card, MockRemote};

    #[tokio::test]
    async fn scheduler_drains_the_pending_queue() {
        let store = Arc::new(MemoryStore::new());
        let remote = MockRemote::new();
        let repository = LocalFirstRepository::new(
            Arc::clone(&store) as Arc<dyn EntityStore<CreditCard>>,
            Arc::clone(&remote) as Arc<dyn RemoteApi<CreditCard>>,
            Arc::new(NetworkMonitor::new(NetworkStatus::Online)),
            Arc::new(EventBus::new()),
            SyncSettings::default(),
        );
        store.put(card("card-1", "owner-1")).await.unwrap();

        let scheduler =
            SyncScheduler::spawn_with_interval(Arc::clone(&repository), Duration::from_millis(10));

        // Give the scheduler a few cycles to run.
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if remote.call_count() > 0 {
                break;
            }
        }
        scheduler.shutdown();

        let pushed = store.get("card-1").await.unwrap().unwrap();
        assert_eq!(pushed.sync_state, SyncState::Clean);
    }
}

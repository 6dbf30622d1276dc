//! Connectivity monitor: last-known status plus transition listeners.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::subscription::SubscriptionGuard;

/// Last-observed connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

type Listener = Arc<dyn Fn(NetworkStatus) + Send + Sync>;
type ListenerList = Arc<Mutex<Vec<(u64, Listener)>>>;

/// Single source of truth for "can we reach the remote backend".
///
/// `status()` returns the last state reported by the platform probe and
/// never blocks; nothing in here touches the network. Listeners fire once
/// per transition, not per probe.
pub struct NetworkMonitor {
    online: AtomicBool,
    next_id: AtomicU64,
    listeners: ListenerList,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            online: AtomicBool::new(initial == NetworkStatus::Online),
            next_id: AtomicU64::new(0),
            listeners: Arc::default(),
        }
    }

    pub fn status(&self) -> NetworkStatus {
        if self.online.load(Ordering::SeqCst) {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a status observed by the platform probe. Listeners run on the
    /// caller's thread, and only when the status actually changed.
    pub fn set_status(&self, status: NetworkStatus) {
        let now_online = status == NetworkStatus::Online;
        let was_online = self.online.swap(now_online, Ordering::SeqCst);
        if was_online == now_online {
            return;
        }

        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                error!("Connectivity listener panicked on transition to {}", status);
            }
        }
    }

    /// A failed probe means the backend is unreachable.
    pub fn report_probe_error(&self, err: &dyn fmt::Display) {
        warn!("Connectivity probe failed, assuming offline: {}", err);
        self.set_status(NetworkStatus::Offline);
    }

    /// Register a transition listener. The returned guard unsubscribes
    /// idempotently and on drop.
    pub fn on_transition<F>(&self, listener: F) -> SubscriptionGuard
    where
        F: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        let listeners: Weak<_> = Arc::downgrade(&self.listeners);
        SubscriptionGuard::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn listeners_fire_once_per_transition() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let transitions = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&transitions);
        let _guard = monitor.on_transition(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_status(NetworkStatus::Online);
        monitor.set_status(NetworkStatus::Online);
        monitor.set_status(NetworkStatus::Offline);

        assert_eq!(transitions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn probe_errors_coerce_to_offline() {
        let monitor = NetworkMonitor::new(NetworkStatus::Online);
        monitor.report_probe_error(&"connection reset");
        assert_eq!(monitor.status(), NetworkStatus::Offline);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let transitions = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&transitions);
        let guard = monitor.on_transition(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        guard.unsubscribe();
        guard.unsubscribe();

        monitor.set_status(NetworkStatus::Online);
        assert_eq!(transitions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn status_reads_are_synchronous_and_current() {
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        assert!(!monitor.is_online());
        monitor.set_status(NetworkStatus::Online);
        assert!(monitor.is_online());
    }
}

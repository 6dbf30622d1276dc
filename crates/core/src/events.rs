//! Process-wide publish/subscribe channel for mutation notifications.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::error;
use serde::{Deserialize, Serialize};

use crate::network::{NetworkMonitor, NetworkStatus};
use crate::subscription::SubscriptionGuard;
use crate::sync::EntityKind;

/// Events emitted by repositories after local or remote-confirmed mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A record was created locally (optimistic, not yet confirmed).
    Created { kind: EntityKind, id: String },
    /// A record was updated locally (optimistic, not yet confirmed).
    Updated { kind: EntityKind, id: String },
    /// A record was deleted locally (soft or hard).
    Deleted { kind: EntityKind, id: String },
    /// The backend acknowledged a pending push.
    SyncCompleted {
        kind: EntityKind,
        id: String,
        remote_id: String,
    },
    /// A non-retryable push failure rolled the record back to its
    /// pre-mutation state.
    SyncRolledBack {
        kind: EntityKind,
        id: String,
        reason: String,
    },
    /// Bounded retries were exhausted; the record awaits manual resolution.
    ConflictFlagged { kind: EntityKind, id: String },
    /// Connectivity transitioned.
    ConnectivityChanged { status: NetworkStatus },
}

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;
type HandlerList = Arc<Mutex<Vec<(u64, Handler)>>>;

/// Synchronous, in-order, fire-and-forget event bus.
///
/// Delivery happens on the emitter's thread in subscription order. A
/// panicking handler is caught and logged; it never reaches the emitter or
/// later handlers. There is no replay: a subscriber registered after an
/// event was emitted never sees it.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: HandlerList,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionGuard
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));

        let handlers: Weak<_> = Arc::downgrade(&self.handlers);
        SubscriptionGuard::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                handlers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(handler_id, _)| *handler_id != id);
            }
        })
    }

    pub fn emit(&self, event: &DomainEvent) {
        // Snapshot outside the lock so handlers may subscribe or emit.
        let snapshot: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler panicked while processing {:?}", event);
            }
        }
    }
}

/// Forward connectivity transitions onto the bus, so UI subscribers can
/// render online/offline banners without touching the monitor directly.
pub fn bridge_connectivity(monitor: &NetworkMonitor, bus: Arc<EventBus>) -> SubscriptionGuard {
    monitor.on_transition(move |status| {
        bus.emit(&DomainEvent::ConnectivityChanged { status });
    })
}

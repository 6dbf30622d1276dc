//! Scoped subscription handle with idempotent release.

use std::sync::{Mutex, PoisonError};

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle returned by listener registrations.
///
/// `unsubscribe` removes the listener; calling it more than once is a no-op,
/// never an error. Dropping the guard releases the subscription as well, so
/// a listener can never outlive the scope that owns it.
pub struct SubscriptionGuard {
    teardown: Mutex<Option<Teardown>>,
}

impl SubscriptionGuard {
    pub(crate) fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// Remove the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        let taken = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = taken {
            teardown();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let guard = SubscriptionGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        guard.unsubscribe();
        guard.unsubscribe();
        drop(guard);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_the_subscription() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        drop(SubscriptionGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}

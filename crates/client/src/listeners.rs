//! State-change listener registry.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::warn;

use crate::types::ClientState;

/// Callback type for state changes.
pub type StateCallback = Arc<dyn Fn(&ClientState) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, StateCallback)>>,
}

impl ListenerSet {
    pub(crate) fn add(self: &Arc<Self>, callback: StateCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, callback));
        Subscription {
            id,
            set: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        lock(&self.entries).retain(|(entry, _)| *entry != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Calls every listener with `state`.
    ///
    /// The registry lock is not held while callbacks run, so a listener may
    /// subscribe, unsubscribe or dispose the client. A panicking listener is
    /// logged and skipped.
    pub(crate) fn notify(&self, state: &ClientState) {
        let callbacks: Vec<StateCallback> =
            lock(&self.entries).iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| cb(state))).is_err() {
                warn!(link = %state.link_state, "state listener panicked");
            }
        }
    }
}

/// Handle returned by [`TelemetryClient::on_state_change`](crate::TelemetryClient::on_state_change).
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    set: Weak<ListenerSet>,
}

impl Subscription {
    /// Removes the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(set) = self.set.upgrade() {
            set.remove(self.id);
        }
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

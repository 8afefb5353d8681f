//! Deferred actions owned by the client loop.
//!
//! A pending reconnect or handshake deadline is a value, not a detached
//! task: dropping or cancelling the [`Deadline`] is all it takes to make
//! sure nothing fires later.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

/// At most one pending expiry.
#[derive(Default)]
pub(crate) struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    /// Arms the deadline. Returns `false` (and keeps the existing expiry) if
    /// one is already pending.
    pub(crate) fn schedule(&mut self, delay: Duration) -> bool {
        if self.sleep.is_some() {
            return false;
        }
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
        true
    }

    /// Drops any pending expiry.
    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.sleep.is_some()
    }

    /// Expiry instant, if armed.
    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<tokio::time::Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Resolves when the deadline expires, then disarms.
    /// Never resolves while nothing is scheduled.
    ///
    /// Cancel safe: if the returned future is dropped the expiry is kept.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => future::pending().await,
        }
    }
}

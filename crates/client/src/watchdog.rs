//! Periodic staleness poll.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Polls at a fixed period and judges whether the feed has gone quiet.
///
/// Detection latency is bounded by `period + window`, not zero.
pub(crate) struct Watchdog {
    interval: Interval,
    window: Duration,
}

impl Watchdog {
    pub(crate) fn new(period: Duration, window: Duration) -> Self {
        // Tokio intervals reject a zero period.
        let period = period.max(MIN_PERIOD);
        // First tick one period from now, not immediately.
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, window }
    }

    /// Waits for the next poll.
    pub(crate) async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Whether more than the window has passed since `last_activity`.
    pub(crate) fn is_stale(&self, last_activity: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_activity) > self.window
    }
}

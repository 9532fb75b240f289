//! Backoff decisions from a rolling failure window.

use std::time::Duration;

use tokio::time::Instant;

/// Failures further apart than this start a new episode.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(30);

/// Delay between reconnect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Cumulative downtime after which retrying stops.
pub const DEFAULT_FATAL_THRESHOLD: Duration = Duration::from_secs(10);

/// Rolling record of the current failure episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryWindow {
    pub last_failure_at: Option<Instant>,
    pub cumulative_downtime: Duration,
}

/// Outcome of one [`RetryPolicy::next_delay`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub delay: Duration,
    /// The caller must stop retrying and shut the process down.
    pub fatal: bool,
}

/// Fixed-delay retry with a cumulative downtime budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub quiet_period: Duration,
    pub retry_delay: Duration,
    pub fatal_threshold: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            retry_delay: DEFAULT_RETRY_DELAY,
            fatal_threshold: DEFAULT_FATAL_THRESHOLD,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default quiet period and delay and a custom threshold.
    pub fn with_threshold(fatal_threshold: Duration) -> Self {
        Self {
            fatal_threshold,
            ..Self::default()
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Record a failure at `now` and decide what to do next.
    ///
    /// The first failure, or one arriving more than `quiet_period` after the
    /// previous one, resets the downtime to zero. Otherwise the time since the
    /// previous failure is added to it.
    pub fn next_delay(&self, now: Instant, window: &mut RetryWindow) -> RetryDecision {
        match window.last_failure_at {
            Some(last) if now.saturating_duration_since(last) <= self.quiet_period => {
                window.cumulative_downtime += now.saturating_duration_since(last);
            }
            _ => window.cumulative_downtime = Duration::ZERO,
        }
        window.last_failure_at = Some(now);

        RetryDecision {
            delay: self.retry_delay,
            fatal: window.cumulative_downtime > self.fatal_threshold,
        }
    }
}

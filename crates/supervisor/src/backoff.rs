use std::time::Duration;

/// Reconnection delay policy.
///
/// Delays start at `initial`, grow by `multiplier` plus up to `jitter` per
/// attempt and hold at `max`. A consumption period of at least `reset_after`
/// starts the sequence over.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// First delay.
    pub initial: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Growth factor between attempts.
    pub multiplier: f64,
    /// Consumption time after which the delay resets.
    pub reset_after: Duration,
    /// Extra random growth, as a fraction between 0 and 1.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            reset_after: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

/// Per-worker backoff state.
#[derive(Clone, Debug)]
pub struct Backoff {
    attempt: u32,
    next: Duration,
    policy: BackoffPolicy,
}

impl Backoff {
    /// Starts a fresh sequence.
    #[must_use]
    pub const fn new(policy: BackoffPolicy) -> Self {
        Self {
            attempt: 0,
            next: policy.initial,
            policy,
        }
    }

    /// Retries scheduled since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next retry and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.policy.max);
        self.attempt = self.attempt.saturating_add(1);

        let factor = fastrand::f64().mul_add(self.policy.jitter, self.policy.multiplier);
        self.next = Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .map_or(self.policy.max, |grown| grown.min(self.policy.max))
            .max(delay);

        delay
    }

    /// Starts over if a consumption period lasted long enough.
    pub fn record_consumption(&mut self, lasted: Duration) {
        if lasted >= self.policy.reset_after {
            self.reset();
        }
    }

    /// Starts over.
    pub const fn reset(&mut self) {
        self.attempt = 0;
        self.next = self.policy.initial;
    }
}

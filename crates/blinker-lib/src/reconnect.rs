//! Exponential backoff with jitter for link retries and reconnection.
//!
//! [`BackoffConfig`] computes the delay for a given attempt number;
//! [`ReconnectState`] tracks the background reconnect loop's progress and
//! [`RetryBudget`] caps the cumulative sleep of one retry cycle.

use std::time::Duration;

/// Configuration for backoff timing.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt (typically 2.0).
    pub multiplier: f64,
    /// Upper bound of the random extra delay, as a fraction of the base delay.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Base delay for the 0-based `attempt`: `initial * multiplier^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// `delay_for(attempt)` plus a random 0..jitter share of it.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        self.with_jitter(self.delay_for(attempt), rand::random::<f64>())
    }

    /// Apply jitter to `base` using `unit` in `[0, 1)` as the random draw.
    pub fn with_jitter(&self, base: Duration, unit: f64) -> Duration {
        let extra = base.as_secs_f64() * self.jitter * unit.clamp(0.0, 1.0);
        base + Duration::from_secs_f64(extra.max(0.0))
    }
}

/// Reconnection state machine with exponential backoff.
#[derive(Debug)]
pub struct ReconnectState {
    config: BackoffConfig,
    consecutive_failures: u32,
}

impl ReconnectState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt and advance the backoff.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current backoff delay with jitter applied.
    pub fn next_delay(&self) -> Duration {
        self.config.jittered_delay(self.consecutive_failures)
    }
}

/// Cumulative sleep allowance for one retry cycle.
#[derive(Debug)]
pub struct RetryBudget {
    remaining: Duration,
}

impl RetryBudget {
    pub fn new(ceiling: Duration) -> Self {
        Self { remaining: ceiling }
    }

    /// Take up to `wanted` from the budget, returning what may actually be slept.
    pub fn take(&mut self, wanted: Duration) -> Duration {
        let granted = wanted.min(self.remaining);
        self.remaining -= granted;
        granted
    }
}

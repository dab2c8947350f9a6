//! Process shutdown signal and interruptible sleeps.
//!
//! Every wait in the crate (backoff delays, flash ticks, sample polling) goes
//! through [`Shutdown::wait`] so that Ctrl+C wakes all threads immediately.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A sleep that can be cut short.
pub trait Sleep: Send + Sync {
    /// Sleep for `duration`. Returns `false` if the sleep was interrupted by shutdown.
    fn sleep(&self, duration: Duration) -> bool;
}

/// Cloneable shutdown flag shared by every execution context.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiting thread.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout`. Returns `true` if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let remaining = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            };
            if remaining.is_zero() {
                break;
            }
            stopped = cvar
                .wait_timeout(stopped, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        *stopped
    }
}

impl Sleep for Shutdown {
    fn sleep(&self, duration: Duration) -> bool {
        !self.wait(duration)
    }
}

/// Test double that records requested delays instead of sleeping.
#[doc(hidden)]
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSleep {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleep {
        pub fn new() -> Self {
            Self::default()
        }

        /// All delays requested so far, in order.
        pub fn delays(&self) -> Vec<Duration> {
            self.delays
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl Sleep for RecordingSleep {
        fn sleep(&self, duration: Duration) -> bool {
            self.delays
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(duration);
            true
        }
    }
}

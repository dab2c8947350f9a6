//! Process-wide health record read by status consumers.
//!
//! One mutex guards every field so a [`HealthSnapshot`] is always internally
//! consistent. Writers are crate-private: only the connection manager and the
//! sequence controller update it.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Link classification derived from the consecutive failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// No exchange attempted yet.
    Initializing,
    Healthy,
    /// At least one consecutive failure, still below the threshold.
    Degraded,
    Critical,
}

impl Connectivity {
    pub fn is_critical(self) -> bool {
        self == Connectivity::Critical
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Initializing => write!(f, "initializing"),
            Connectivity::Healthy => write!(f, "healthy"),
            Connectivity::Degraded => write!(f, "degraded"),
            Connectivity::Critical => write!(f, "critical"),
        }
    }
}

/// Immutable copy of the registry handed to status consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: Connectivity,
    pub last_successful_connection: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub button_press_count: u64,
    pub last_error: Option<String>,
}

/// A connectivity change caused by one recorded exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Connectivity,
    pub to: Connectivity,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug)]
struct Inner {
    status: Connectivity,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_success: Option<DateTime<Utc>>,
    presses: u64,
}

#[derive(Debug)]
pub struct HealthRegistry {
    inner: Mutex<Inner>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        HealthRegistry {
            inner: Mutex::new(Inner {
                status: Connectivity::Initializing,
                consecutive_failures: 0,
                last_error: None,
                last_success: None,
                presses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.lock();
        HealthSnapshot {
            status: inner.status,
            last_successful_connection: inner.last_success,
            failed_attempts: inner.consecutive_failures,
            button_press_count: inner.presses,
            last_error: inner.last_error.clone(),
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.lock().status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Any successful exchange returns straight to `Healthy`.
    pub(crate) fn record_success(&self) -> Transition {
        let mut inner = self.lock();
        let from = inner.status;
        inner.status = Connectivity::Healthy;
        inner.consecutive_failures = 0;
        inner.last_error = None;
        inner.last_success = Some(Utc::now());
        Transition {
            from,
            to: Connectivity::Healthy,
        }
    }

    /// Count one failed exchange against `threshold`.
    pub(crate) fn record_failure(&self, error: &str, threshold: u32) -> Transition {
        let mut inner = self.lock();
        let from = inner.status;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_error = Some(error.to_string());
        inner.status = if inner.consecutive_failures >= threshold.max(1) {
            Connectivity::Critical
        } else {
            Connectivity::Degraded
        };
        Transition {
            from,
            to: inner.status,
        }
    }

    pub(crate) fn record_press(&self) -> u64 {
        let mut inner = self.lock();
        inner.presses += 1;
        inner.presses
    }
}

//! Connectivity lifecycle for the lighting endpoint.
//!
//! [`ConnectionManager`] gates every command on link availability, retries
//! failed sends with exponential backoff and jitter, runs the background
//! reconnect loop, caches the effect list and replays the last intended
//! LED state whenever the link comes back.
//!
//! No lock is held across a network call or a backoff sleep: the endpoint is
//! cloned out of its `RwLock` before use and results are applied afterwards.
//! Each endpoint carries a generation number; results from an endpoint that
//! was replaced in the meantime are discarded.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use crate::config::{Config, seconds};
use crate::endpoint::{DeviceInfo, EndpointError, LightingEndpoint};
use crate::health::HealthRegistry;
use crate::led::LedCommand;
use crate::reconnect::{BackoffConfig, ReconnectState, RetryBudget};
use crate::shutdown::{Shutdown, Sleep};

/// Ceiling for a single backoff delay and for the cumulative sleep of one retry cycle.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// How long a fetched effect list stays fresh.
pub const EFFECTS_TTL: Duration = Duration::from_secs(300);

/// How often the reconnect loop checks whether the link dropped.
const LINK_POLL: Duration = Duration::from_millis(250);

// ── Error type ──

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The link is down or restoring; the command was dropped without I/O.
    Unavailable,
    /// Every attempt failed, or the failures made the link critical.
    Exhausted { attempts: u32, last: EndpointError },
    /// A backoff sleep was cut short by shutdown.
    Interrupted,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Unavailable => write!(f, "WLED link unavailable"),
            LinkError::Exhausted { attempts, last } => {
                write!(f, "WLED command failed after {attempts} attempt(s): {last}")
            }
            LinkError::Interrupted => write!(f, "WLED command interrupted by shutdown"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

// ── Seams ──

/// Supplies the command to replay after the link comes back.
pub trait RestoreSource: Send + Sync {
    fn restore_command(&self) -> Option<LedCommand>;
}

/// Where the sequence controller sends its commands.
pub trait CommandSink: Send + Sync {
    fn is_available(&self) -> bool;
    fn dispatch(&self, command: &LedCommand) -> Result<(), LinkError>;
}

// ── Settings ──

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub reconnect_delay: Duration,
    /// Consecutive failures at which the link turns critical.
    pub failure_threshold: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            failure_threshold: 5,
        }
    }
}

impl LinkSettings {
    pub fn from_config(config: &Config) -> Self {
        LinkSettings {
            max_retries: config.max_retries.max(1),
            retry_delay: seconds(config.retry_delay),
            reconnect_delay: seconds(config.reconnect_delay),
            failure_threshold: config.max_failed_attempts.max(1),
        }
    }

    fn retry_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.retry_delay,
            max_delay: BACKOFF_CEILING,
            ..BackoffConfig::default()
        }
    }

    fn reconnect_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_delay,
            max_delay: BACKOFF_CEILING,
            ..BackoffConfig::default()
        }
    }
}

// ── Manager ──

struct CachedEffects {
    effects: Arc<Vec<String>>,
    fetched_at: Instant,
}

pub struct ConnectionManager {
    endpoint: RwLock<Arc<dyn LightingEndpoint>>,
    /// Bumped under the endpoint write lock on every replacement.
    generation: AtomicU64,
    health: Arc<HealthRegistry>,
    settings: RwLock<LinkSettings>,
    sleeper: Arc<dyn Sleep>,
    linked: AtomicBool,
    restoring: AtomicBool,
    restore_source: RwLock<Option<Weak<dyn RestoreSource>>>,
    effects: Mutex<Option<CachedEffects>>,
    device: Mutex<Option<DeviceInfo>>,
    restorations: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        endpoint: Arc<dyn LightingEndpoint>,
        health: Arc<HealthRegistry>,
        settings: LinkSettings,
        sleeper: Arc<dyn Sleep>,
    ) -> Self {
        ConnectionManager {
            endpoint: RwLock::new(endpoint),
            generation: AtomicU64::new(0),
            health,
            settings: RwLock::new(settings),
            sleeper,
            linked: AtomicBool::new(false),
            restoring: AtomicBool::new(false),
            restore_source: RwLock::new(None),
            effects: Mutex::new(None),
            device: Mutex::new(None),
            restorations: AtomicU64::new(0),
        }
    }

    pub fn set_restore_source(&self, source: Weak<dyn RestoreSource>) {
        *self
            .restore_source
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    pub fn settings(&self) -> LinkSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_settings(&self, settings: LinkSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Swap in a new endpoint (address or credentials changed).
    ///
    /// The link is marked down so the reconnect loop probes the new device and
    /// replays the last known state on it.
    pub fn replace_endpoint(&self, endpoint: Arc<dyn LightingEndpoint>) {
        {
            let mut current = self.endpoint.write().unwrap_or_else(PoisonError::into_inner);
            *current = endpoint;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        *self.effects.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if self.linked.swap(false, Ordering::SeqCst) {
            log::info!("endpoint replaced, reconnecting");
        }
    }

    /// The current endpoint and its generation.
    fn endpoint(&self) -> (Arc<dyn LightingEndpoint>, u64) {
        let current = self.endpoint.read().unwrap_or_else(PoisonError::into_inner);
        (current.clone(), self.generation.load(Ordering::SeqCst))
    }

    fn is_stale(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) == generation {
            return false;
        }
        log::debug!("result from a replaced endpoint discarded");
        true
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    /// Device info from the last successful probe.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed state restorations.
    pub fn restorations(&self) -> u64 {
        self.restorations.load(Ordering::SeqCst)
    }

    /// Linked, not critical, and not in the middle of a restoration.
    pub fn is_available(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
            && !self.restoring.load(Ordering::SeqCst)
            && !self.health.connectivity().is_critical()
    }

    fn link_down(&self) -> bool {
        !self.linked.load(Ordering::SeqCst)
    }

    // ── Bookkeeping ──

    fn note_success(&self, generation: u64) {
        if self.is_stale(generation) {
            return;
        }
        let t = self.health.record_success();
        if t.changed() {
            log::info!("link {} -> {}", t.from, t.to);
        }
        if self.linked.load(Ordering::SeqCst) {
            return;
        }
        // Only the thread that claims `restoring` may link and replay state.
        // Everyone else leaves the link to it.
        if self
            .restoring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if self
            .linked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            log::info!("link available");
            self.restore_state();
        }
        self.restoring.store(false, Ordering::SeqCst);
    }

    fn note_failure(&self, generation: u64, error: &EndpointError) {
        if self.is_stale(generation) {
            return;
        }
        let threshold = self.settings().failure_threshold;
        let t = self.health.record_failure(&error.to_string(), threshold);
        if t.changed() {
            log::warn!("link {} -> {}", t.from, t.to);
        }
        if t.to.is_critical() && self.linked.swap(false, Ordering::SeqCst) {
            log::error!(
                "link lost after {} consecutive failures, reconnecting in background",
                self.health.consecutive_failures()
            );
        }
    }

    fn restore_state(&self) {
        let source = self
            .restore_source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(command) = source.and_then(|s| s.restore_command()) else {
            log::debug!("nothing to restore");
            return;
        };
        log::info!("restoring last known LED state");
        match self.send_with_retry(&command) {
            Ok(()) => {
                self.restorations.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => log::warn!("could not restore LED state: {e}"),
        }
    }

    // ── Operations ──

    /// One `fetch_info` probe. Returns whether it succeeded.
    pub fn connect(&self) -> bool {
        let (endpoint, generation) = self.endpoint();
        match endpoint.fetch_info() {
            Ok(info) => {
                log::info!(
                    "connected to {} (WLED {}) with {} LEDs",
                    if info.name.is_empty() { "WLED" } else { info.name.as_str() },
                    info.version,
                    info.leds.count
                );
                *self.device.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
                self.note_success(generation);
                true
            }
            Err(e) => {
                log::warn!("connection probe failed: {e}");
                self.note_failure(generation, &e);
                false
            }
        }
    }

    fn send_with_retry(&self, command: &LedCommand) -> Result<(), LinkError> {
        let settings = self.settings();
        let backoff = settings.retry_backoff();
        let mut budget = RetryBudget::new(BACKOFF_CEILING);
        let mut last = EndpointError::Http("no attempt made".into());
        for attempt in 0..settings.max_retries {
            let (endpoint, generation) = self.endpoint();
            match endpoint.send_state(command) {
                Ok(()) => {
                    self.note_success(generation);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("send failed (attempt {}): {e}", attempt + 1);
                    self.note_failure(generation, &e);
                    if self.link_down() {
                        return Err(LinkError::Exhausted {
                            attempts: attempt + 1,
                            last: e,
                        });
                    }
                    last = e;
                }
            }
            if attempt + 1 == settings.max_retries {
                break;
            }
            let delay = budget.take(backoff.jittered_delay(attempt));
            if !delay.is_zero() && !self.sleeper.sleep(delay) {
                return Err(LinkError::Interrupted);
            }
        }
        Err(LinkError::Exhausted {
            attempts: settings.max_retries,
            last,
        })
    }

    /// Fetch the effect list through the cache at time `now`.
    ///
    /// A fresh cache is served without I/O. A stale or empty cache is refetched
    /// when the link is available; a failed refetch returns the previous list.
    pub fn effects_at(&self, now: Instant) -> Arc<Vec<String>> {
        let previous = {
            let cache = self.effects.lock().unwrap_or_else(PoisonError::into_inner);
            match cache.as_ref() {
                Some(c) if now.saturating_duration_since(c.fetched_at) < EFFECTS_TTL => {
                    return c.effects.clone();
                }
                Some(c) => c.effects.clone(),
                None => Arc::new(Vec::new()),
            }
        };
        if !self.is_available() {
            return previous;
        }
        let (endpoint, generation) = self.endpoint();
        match endpoint.fetch_effects() {
            Ok(list) => {
                log::info!("retrieved {} effects", list.len());
                self.note_success(generation);
                let effects = Arc::new(list);
                *self.effects.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(CachedEffects {
                        effects: effects.clone(),
                        fetched_at: now,
                    });
                effects
            }
            Err(e) => {
                log::warn!("effect list refresh failed: {e}");
                self.note_failure(generation, &e);
                previous
            }
        }
    }

    pub fn effects(&self) -> Arc<Vec<String>> {
        self.effects_at(Instant::now())
    }

    /// Probe until the link is up, backing off between attempts.
    ///
    /// Never gives up; returns `false` only when shutdown interrupts it.
    pub fn reconnect_until_available(&self, shutdown: &Shutdown) -> bool {
        let mut state = ReconnectState::new(self.settings().reconnect_backoff());
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            if self.connect() {
                return true;
            }
            let delay = state.next_delay();
            state.record_failure();
            log::info!(
                "reconnect attempt {} failed, retrying in {:.1}s",
                state.consecutive_failures(),
                delay.as_secs_f64()
            );
            if !self.sleeper.sleep(delay) {
                return false;
            }
        }
    }

    /// Background context: keep the link up until shutdown.
    pub fn run_reconnect_loop(&self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            if self.link_down() {
                if !self.reconnect_until_available(shutdown) {
                    break;
                }
            } else if shutdown.wait(LINK_POLL) {
                break;
            }
        }
        log::debug!("reconnect loop stopped");
    }
}

impl CommandSink for ConnectionManager {
    fn is_available(&self) -> bool {
        ConnectionManager::is_available(self)
    }

    /// Send `command`, retrying with backoff. Refuses immediately when unavailable.
    fn dispatch(&self, command: &LedCommand) -> Result<(), LinkError> {
        if !self.is_available() {
            return Err(LinkError::Unavailable);
        }
        self.send_with_retry(command)
    }
}

//! Wiring of the core components into a running service.
//!
//! [`Service::start`] builds the health registry, connection manager and
//! sequence controller, registers the restoration hook and spawns the two
//! long-lived threads: the sequence scheduler and the link keeper (initial
//! connect followed by the reconnect loop). The input sampler is driven by the
//! caller so tests and simulations can run without hardware.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::{Config, seconds};
use crate::connection::{ConnectionManager, LinkSettings, RestoreSource};
use crate::debounce::{ButtonEvent, DebounceClassifier, PressEvent, PressKind, ThresholdHandle};
use crate::endpoint::{LightingEndpoint, WledHttp};
use crate::error::Result;
use crate::health::{HealthRegistry, HealthSnapshot};
use crate::sequence::{SequenceController, SequenceSettings, SequenceState};
use crate::shutdown::Shutdown;

/// Builds the lighting endpoint for a config. Swapped out in tests.
pub type EndpointFactory =
    Box<dyn Fn(&Config) -> Result<Arc<dyn LightingEndpoint>> + Send + Sync>;

/// Factory producing the real WLED HTTP client.
pub fn http_factory() -> EndpointFactory {
    Box::new(|config| {
        let http = WledHttp::from_config(config)?;
        Ok(Arc::new(http) as Arc<dyn LightingEndpoint>)
    })
}

pub struct Service {
    config: Mutex<Config>,
    factory: EndpointFactory,
    health: Arc<HealthRegistry>,
    link: Arc<ConnectionManager>,
    sequence: Arc<SequenceController>,
    threshold: ThresholdHandle,
    shutdown: Shutdown,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Service {
    /// Validate `config`, build every component and start the background threads.
    pub fn start(config: Config, factory: EndpointFactory, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;
        let sequence_settings = SequenceSettings::from_config(&config)?;
        let endpoint = factory(&config)?;

        let health = Arc::new(HealthRegistry::new());
        let link = Arc::new(ConnectionManager::new(
            endpoint,
            health.clone(),
            LinkSettings::from_config(&config),
            Arc::new(shutdown.clone()),
        ));
        let sequence = Arc::new(SequenceController::new(
            sequence_settings,
            link.clone(),
            health.clone(),
        ));
        let source: Weak<dyn RestoreSource> = Arc::downgrade(&sequence) as Weak<dyn RestoreSource>;
        link.set_restore_source(source);
        sequence.show_idle();

        let service = Service {
            threshold: ThresholdHandle::new(seconds(config.long_press_threshold)),
            config: Mutex::new(config),
            factory,
            health,
            link,
            sequence,
            shutdown,
            threads: Mutex::new(Vec::new()),
        };
        service.spawn_threads()?;
        log::info!("service started");
        Ok(service)
    }

    fn spawn_threads(&self) -> Result<()> {
        let sequence = self.sequence.clone();
        let scheduler = std::thread::Builder::new()
            .name("sequence".into())
            .spawn(move || sequence.run())?;

        let link = self.link.clone();
        let shutdown = self.shutdown.clone();
        let keeper = std::thread::Builder::new()
            .name("link".into())
            .spawn(move || link.run_reconnect_loop(&shutdown))?;

        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.push(scheduler);
        threads.push(keeper);
        Ok(())
    }

    /// A classifier bound to the live long-press threshold.
    pub fn classifier(&self) -> DebounceClassifier {
        let samples = self.config().debounce_samples;
        DebounceClassifier::new(samples, self.threshold.clone())
    }

    /// Forward one classified event from the input line.
    pub fn handle_event(&self, event: ButtonEvent) {
        self.sequence.handle(event);
    }

    /// Synthesize a press exactly like a debounced one.
    ///
    /// A long press is held for the long-press threshold and then released
    /// from a short-lived helper thread.
    pub fn inject(&self, kind: PressKind) {
        log::info!("simulated {kind} press");
        self.sequence
            .handle(ButtonEvent::Press(PressEvent::simulated(kind)));
        if kind == PressKind::Long {
            let sequence = self.sequence.clone();
            let shutdown = self.shutdown.clone();
            let hold = self.threshold.get();
            let spawned = std::thread::Builder::new()
                .name("simulated-release".into())
                .spawn(move || {
                    let started = Instant::now();
                    shutdown.wait(hold);
                    sequence.handle(ButtonEvent::Release {
                        held: started.elapsed(),
                    });
                });
            if let Err(e) = spawned {
                log::warn!("could not schedule simulated release: {e}");
                self.sequence.handle(ButtonEvent::Release {
                    held: Duration::ZERO,
                });
            }
        }
    }

    /// Apply a new configuration without restarting.
    ///
    /// Invalid configs are rejected before any component is touched. Input
    /// line settings are stored but only take effect after a restart.
    pub fn apply_config(&self, new: Config) -> Result<()> {
        new.validate()?;
        let sequence_settings = SequenceSettings::from_config(&new)?;
        let old = self.config();

        let endpoint = if old.endpoint_changed(&new) {
            Some((self.factory)(&new)?)
        } else {
            None
        };
        if old.input_changed(&new) {
            log::warn!("input pin/polarity/debounce changed; restart to apply");
        }

        self.link.update_settings(LinkSettings::from_config(&new));
        if let Some(endpoint) = endpoint {
            log::info!("WLED endpoint changed to {}", new.wled_address);
            self.link.replace_endpoint(endpoint);
        }
        self.threshold.set(seconds(new.long_press_threshold));
        self.sequence.update_settings(sequence_settings);
        self.sequence.show_idle();
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = new;
        log::info!("configuration applied");
        Ok(())
    }

    pub fn config(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub fn effects(&self) -> Arc<Vec<String>> {
        self.link.effects()
    }

    pub fn state(&self) -> SequenceState {
        self.sequence.state()
    }

    pub fn is_available(&self) -> bool {
        self.link.is_available()
    }

    pub fn link(&self) -> &ConnectionManager {
        &self.link
    }

    pub fn sequence(&self) -> &SequenceController {
        &self.sequence
    }

    /// Poll until the link is available or `timeout` passes.
    pub fn wait_until_available(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        while !self.link.is_available() {
            if deadline.is_some_and(|d| Instant::now() >= d) || self.shutdown.wait(Duration::from_millis(10)) {
                return false;
            }
        }
        true
    }

    /// Trigger shutdown and join the background threads.
    pub fn stop(&self) {
        self.shutdown.trigger();
        self.sequence.stop();
        let threads: Vec<_> = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in threads {
            let name = handle.thread().name().unwrap_or("?").to_string();
            if handle.join().is_err() {
                log::error!("{name} thread panicked");
            }
        }
        log::info!("service stopped");
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

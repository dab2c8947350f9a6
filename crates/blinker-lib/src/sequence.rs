//! Press-driven LED sequences.
//!
//! [`SequenceController`] owns what the strip should currently be doing. A
//! short press starts a bounded flashing sequence, a long press starts one
//! that runs until release, and every sequence ends with the idle/default
//! command. All transitions happen under one mutex; a single scheduler thread
//! ([`SequenceController::run`]) turns the current state into commands and
//! dispatches them outside the lock.
//!
//! Each transition bumps an epoch and clears any queued idle command, so a
//! superseded sequence can never produce another step.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{Config, seconds};
use crate::connection::{CommandSink, LinkError, RestoreSource};
use crate::debounce::{ButtonEvent, PressKind};
use crate::health::HealthRegistry;
use crate::led::{Color, IdleSpec, LedCommand, parse_color};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    ShortActive { started_at: Instant },
    LongActive { started_at: Instant },
}

impl SequenceState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SequenceState::Idle)
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceState::Idle => write!(f, "idle"),
            SequenceState::ShortActive { .. } => write!(f, "short"),
            SequenceState::LongActive { .. } => write!(f, "long"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSettings {
    pub short_duration: Duration,
    /// Full on/off cycle; each color is shown for half of it.
    pub flash_interval: Duration,
    pub short_colors: [Color; 2],
    pub long_colors: [Color; 2],
    pub brightness: i64,
    pub idle: LedCommand,
}

impl SequenceSettings {
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let [s0, s1] = &config.short_colors;
        let [l0, l1] = &config.long_colors;
        let idle = IdleSpec {
            mode: config.default_mode,
            effect_index: config.default_effect_index,
            effect_speed: config.default_effect_speed,
            effect_intensity: config.default_effect_intensity,
            brightness: config.flash_brightness,
            transition: seconds(config.transition_time),
        };
        Ok(SequenceSettings {
            short_duration: seconds(config.short_flash_duration),
            flash_interval: seconds(config.flash_interval),
            short_colors: [parse_color(s0)?, parse_color(s1)?],
            long_colors: [parse_color(l0)?, parse_color(l1)?],
            brightness: config.flash_brightness,
            idle: idle.command(),
        })
    }

    fn frame_period(&self) -> Duration {
        (self.flash_interval / 2).max(Duration::from_millis(10))
    }

    fn frame(&self, long: bool, phase: usize) -> LedCommand {
        let colors = if long {
            &self.long_colors
        } else {
            &self.short_colors
        };
        let color = colors[phase % 2];
        let brightness = if color.is_off() { 0 } else { self.brightness };
        LedCommand::solid(color, brightness, Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Frame,
    Idle,
}

/// One command the scheduler must dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub epoch: u64,
    pub kind: StepKind,
    pub command: LedCommand,
}

#[derive(Debug, PartialEq)]
pub enum Next {
    Send(Step),
    /// Nothing due; sleep until `until` (or indefinitely) unless `changes` moves past `seen`.
    Sleep {
        until: Option<Instant>,
        seen: u64,
    },
    Stop,
}

struct Inner {
    state: SequenceState,
    epoch: u64,
    changes: u64,
    phase: usize,
    next_frame_at: Option<Instant>,
    pending_idle: Option<(u64, LedCommand)>,
    /// A re-queued idle command waits until this tick.
    idle_retry_at: Option<Instant>,
    last_known: LedCommand,
    settings: SequenceSettings,
    in_flight: bool,
    stopped: bool,
}

impl Inner {
    fn begin(&mut self, state: SequenceState, now: Instant) {
        log::info!("sequence {} -> {state}", self.state);
        self.state = state;
        self.epoch += 1;
        self.phase = 0;
        self.next_frame_at = Some(now);
        self.pending_idle = None;
        self.idle_retry_at = None;
    }

    fn finish(&mut self, reason: &str) {
        if !self.state.is_idle() {
            log::info!("sequence {} -> idle ({reason})", self.state);
        }
        self.state = SequenceState::Idle;
        self.epoch += 1;
        self.next_frame_at = None;
        self.last_known = self.settings.idle.clone();
        self.pending_idle = Some((self.epoch, self.last_known.clone()));
        self.idle_retry_at = None;
    }

    fn advance(&mut self, now: Instant) {
        if let SequenceState::ShortActive { started_at } = self.state
            && now.saturating_duration_since(started_at) >= self.settings.short_duration
        {
            self.finish("short sequence complete");
        }
    }

    fn next_step(&mut self, now: Instant) -> Next {
        if self.stopped {
            return Next::Stop;
        }
        self.advance(now);
        if let Some(at) = self.idle_retry_at
            && at > now
            && self.pending_idle.is_some()
        {
            return Next::Sleep {
                until: Some(at),
                seen: self.changes,
            };
        }
        if let Some((epoch, command)) = self.pending_idle.take() {
            self.idle_retry_at = None;
            return Next::Send(Step {
                epoch,
                kind: StepKind::Idle,
                command,
            });
        }
        let (long, short_deadline) = match self.state {
            SequenceState::Idle => {
                return Next::Sleep {
                    until: None,
                    seen: self.changes,
                };
            }
            SequenceState::ShortActive { started_at } => {
                (false, Some(started_at + self.settings.short_duration))
            }
            SequenceState::LongActive { .. } => (true, None),
        };
        let due = self.next_frame_at.unwrap_or(now);
        if due <= now {
            let command = self.settings.frame(long, self.phase);
            self.phase = self.phase.wrapping_add(1);
            self.next_frame_at = Some(now + self.settings.frame_period());
            return Next::Send(Step {
                epoch: self.epoch,
                kind: StepKind::Frame,
                command,
            });
        }
        let until = match short_deadline {
            Some(deadline) => due.min(deadline),
            None => due,
        };
        Next::Sleep {
            until: Some(until),
            seen: self.changes,
        }
    }
}

pub struct SequenceController {
    inner: Mutex<Inner>,
    wake: Condvar,
    sink: Arc<dyn CommandSink>,
    health: Arc<HealthRegistry>,
}

impl SequenceController {
    pub fn new(
        settings: SequenceSettings,
        sink: Arc<dyn CommandSink>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        SequenceController {
            inner: Mutex::new(Inner {
                state: SequenceState::Idle,
                epoch: 0,
                changes: 0,
                phase: 0,
                next_frame_at: None,
                pending_idle: None,
                idle_retry_at: None,
                last_known: settings.idle.clone(),
                settings,
                in_flight: false,
                stopped: false,
            }),
            wake: Condvar::new(),
            sink,
            health,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changed(&self, inner: &mut Inner) {
        inner.changes = inner.changes.wrapping_add(1);
        self.wake.notify_all();
    }

    pub fn handle(&self, event: ButtonEvent) {
        self.handle_at(event, Instant::now());
    }

    /// Apply one classified event as if it arrived at `now`.
    pub fn handle_at(&self, event: ButtonEvent, now: Instant) {
        let mut inner = self.lock();
        match event {
            ButtonEvent::Press(press) => {
                let count = self.health.record_press();
                log::info!("{} press (#{count})", press.kind);
                match (press.kind, inner.state) {
                    (PressKind::Long, SequenceState::LongActive { .. }) => {
                        log::debug!("long press while long sequence active, ignored");
                    }
                    (PressKind::Long, _) => {
                        inner.begin(SequenceState::LongActive { started_at: now }, now);
                    }
                    (PressKind::Short, SequenceState::LongActive { .. }) => {
                        log::info!("short press during long sequence discarded");
                    }
                    (PressKind::Short, _) => {
                        inner.begin(SequenceState::ShortActive { started_at: now }, now);
                    }
                }
            }
            ButtonEvent::Release { held } => {
                if matches!(inner.state, SequenceState::LongActive { .. }) {
                    inner.finish(&format!("released after {:.1}s", held.as_secs_f64()));
                } else {
                    log::debug!("release outside long sequence ignored");
                }
            }
        }
        self.changed(&mut inner);
    }

    /// Queue the idle/default command if no sequence is running.
    pub fn show_idle(&self) {
        let mut inner = self.lock();
        if inner.state.is_idle() {
            inner.finish("idle refresh");
            self.changed(&mut inner);
        }
    }

    pub fn update_settings(&self, settings: SequenceSettings) {
        let mut inner = self.lock();
        inner.settings = settings;
        self.changed(&mut inner);
    }

    pub fn state(&self) -> SequenceState {
        self.lock().state
    }

    pub fn last_known(&self) -> LedCommand {
        self.lock().last_known.clone()
    }

    /// Idle with nothing queued or being dispatched.
    pub fn is_settled(&self) -> bool {
        let inner = self.lock();
        inner.state.is_idle() && inner.pending_idle.is_none() && !inner.in_flight
    }

    /// Block until [`is_settled`](Self::is_settled) or `timeout`. Returns whether it settled.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.lock();
        loop {
            if inner.state.is_idle() && inner.pending_idle.is_none() && !inner.in_flight {
                return true;
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) || inner.stopped {
                return false;
            }
            let wait = deadline.map_or(Duration::from_secs(3600), |d| d - now);
            inner = self
                .wake
                .wait_timeout(inner, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.stopped = true;
        self.changed(&mut inner);
    }

    /// Compute the next scheduler action at `now`.
    ///
    /// A returned `Send` marks the step in flight until [`complete`](Self::complete).
    pub fn step_at(&self, now: Instant) -> Next {
        let mut inner = self.lock();
        let next = inner.next_step(now);
        if matches!(next, Next::Send(_)) {
            inner.in_flight = true;
        }
        next
    }

    /// Mark the in-flight step as done.
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.in_flight = false;
        self.changed(&mut inner);
    }

    fn sleep_until(&self, until: Option<Instant>, seen: u64) {
        let mut inner = self.lock();
        while inner.changes == seen && !inner.stopped {
            inner = match until {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    self.wake
                        .wait_timeout(inner, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
                None => self
                    .wake
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn execute(&self, step: &Step) -> Result<(), LinkError> {
        let what = match step.kind {
            StepKind::Frame => "flash frame",
            StepKind::Idle => "idle command",
        };
        let result = self.sink.dispatch(&step.command);
        match &result {
            Ok(()) => log::trace!("{what} sent (epoch {})", step.epoch),
            Err(LinkError::Unavailable) => log::debug!("link unavailable, {what} dropped"),
            Err(e) => log::warn!("{what} not applied: {e}"),
        }
        result
    }

    /// Queue an idle step whose retries ran out again, due one frame period
    /// after `now`. Skipped once a newer sequence or idle refresh took over.
    ///
    /// A dropped idle command needs no retry: the link replays the last known
    /// state when it comes back.
    fn defer_idle(&self, step: &Step, now: Instant) {
        let mut inner = self.lock();
        if inner.epoch != step.epoch || !inner.state.is_idle() || inner.pending_idle.is_some() {
            return;
        }
        log::info!("idle command not confirmed, retrying");
        inner.pending_idle = Some((step.epoch, step.command.clone()));
        inner.idle_retry_at = Some(now + inner.settings.frame_period());
        self.changed(&mut inner);
    }

    /// Scheduler loop; returns after [`stop`](Self::stop).
    pub fn run(&self) {
        loop {
            match self.step_at(Instant::now()) {
                Next::Stop => break,
                Next::Send(step) => {
                    let result = self.execute(&step);
                    if step.kind == StepKind::Idle
                        && matches!(result, Err(LinkError::Exhausted { .. }))
                    {
                        self.defer_idle(&step, Instant::now());
                    }
                    self.complete();
                }
                Next::Sleep { until, seen } => self.sleep_until(until, seen),
            }
        }
        log::debug!("sequence scheduler stopped");
    }
}

impl RestoreSource for SequenceController {
    /// The last intended idle command, taking over any queued copy of it.
    fn restore_command(&self) -> Option<LedCommand> {
        let mut inner = self.lock();
        if !inner.state.is_idle() {
            return None;
        }
        inner.pending_idle = None;
        inner.idle_retry_at = None;
        let command = inner.last_known.clone();
        self.changed(&mut inner);
        Some(command)
    }
}

//! Debounce and press classification for the push-button contact.
//!
//! The [`DebounceClassifier`] turns raw per-sample contact levels into clean
//! press/release edges (a level must hold for `debounce_samples` consecutive
//! samples) and classifies each contact as short or long:
//!
//! - released before the threshold → one `Press(Short)` at release time;
//! - still closed at the threshold → `Press(Long)` immediately, then
//!   `Release` once the contact opens.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::input::Contact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

impl std::fmt::Display for PressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressKind::Short => write!(f, "short"),
            PressKind::Long => write!(f, "long"),
        }
    }
}

/// A classified press. `duration` is `None` for a long press that is still held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub kind: PressKind,
    pub started_at: Instant,
    pub duration: Option<Duration>,
}

impl PressEvent {
    /// A press synthesized outside the input line (console, CLI).
    pub fn simulated(kind: PressKind) -> Self {
        PressEvent {
            kind,
            started_at: Instant::now(),
            duration: match kind {
                PressKind::Short => Some(Duration::ZERO),
                PressKind::Long => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press(PressEvent),
    /// The contact of an ongoing long press opened.
    Release { held: Duration },
}

/// Long-press threshold shared between the sampler thread and live config updates.
#[derive(Debug, Clone)]
pub struct ThresholdHandle(Arc<AtomicU64>);

impl ThresholdHandle {
    pub fn new(threshold: Duration) -> Self {
        ThresholdHandle(Arc::new(AtomicU64::new(to_micros(threshold))))
    }

    pub fn set(&self, threshold: Duration) {
        self.0.store(to_micros(threshold), Ordering::Relaxed);
    }

    pub fn get(&self) -> Duration {
        Duration::from_micros(self.0.load(Ordering::Relaxed))
    }
}

fn to_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

pub struct DebounceClassifier {
    debounce_samples: u32,
    long_press: ThresholdHandle,
    stable: Contact,
    pending: Contact,
    pending_since: Option<Instant>,
    run: u32,
    pressed_at: Option<Instant>,
    long_emitted: bool,
}

impl DebounceClassifier {
    /// Create a classifier that starts with the contact open.
    pub fn new(debounce_samples: u32, long_press: ThresholdHandle) -> Self {
        DebounceClassifier {
            debounce_samples: debounce_samples.max(1),
            long_press,
            stable: Contact::Open,
            pending: Contact::Open,
            pending_since: None,
            run: 0,
            pressed_at: None,
            long_emitted: false,
        }
    }

    /// Feed one sample taken at `now`. Returns an event when one resolves.
    pub fn update(&mut self, contact: Contact, now: Instant) -> Option<ButtonEvent> {
        if contact != self.stable {
            if contact == self.pending && self.run > 0 {
                self.run += 1;
            } else {
                self.pending = contact;
                self.run = 1;
                self.pending_since = Some(now);
            }
            if self.run >= self.debounce_samples {
                let edge_at = self.pending_since.take().unwrap_or(now);
                self.stable = contact;
                self.pending = contact;
                self.run = 0;
                if let Some(event) = self.on_edge(contact, edge_at) {
                    return Some(event);
                }
            }
        } else {
            // Flicker shorter than the debounce window
            self.pending = self.stable;
            self.run = 0;
            self.pending_since = None;
        }
        self.check_long(now)
    }

    fn on_edge(&mut self, contact: Contact, at: Instant) -> Option<ButtonEvent> {
        match contact {
            Contact::Closed => {
                self.pressed_at = Some(at);
                self.long_emitted = false;
                None
            }
            Contact::Open => {
                let started_at = self.pressed_at.take()?;
                let held = at.saturating_duration_since(started_at);
                if std::mem::take(&mut self.long_emitted) {
                    Some(ButtonEvent::Release { held })
                } else {
                    Some(ButtonEvent::Press(PressEvent {
                        kind: PressKind::Short,
                        started_at,
                        duration: Some(held),
                    }))
                }
            }
        }
    }

    fn check_long(&mut self, now: Instant) -> Option<ButtonEvent> {
        let started_at = self.pressed_at?;
        if self.long_emitted {
            return None;
        }
        // A pending release counts from when the contact first opened.
        let probe = if self.run > 0 {
            self.pending_since.unwrap_or(now)
        } else {
            now
        };
        if probe.saturating_duration_since(started_at) < self.long_press.get() {
            return None;
        }
        self.long_emitted = true;
        Some(ButtonEvent::Press(PressEvent {
            kind: PressKind::Long,
            started_at,
            duration: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(10);

    /// Feed `levels` one per 10ms tick starting at `t0`, collecting events.
    fn feed(c: &mut DebounceClassifier, t0: Instant, levels: &[Contact]) -> Vec<ButtonEvent> {
        levels
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| c.update(l, t0 + TICK * i as u32))
            .collect()
    }

    fn classifier(samples: u32, threshold: Duration) -> DebounceClassifier {
        DebounceClassifier::new(samples, ThresholdHandle::new(threshold))
    }

    fn levels(spec: &[(Contact, usize)]) -> Vec<Contact> {
        spec.iter()
            .flat_map(|&(c, n)| std::iter::repeat_n(c, n))
            .collect()
    }

    use Contact::{Closed, Open};

    #[test]
    fn short_press_emitted_once_at_release() {
        let mut c = classifier(3, Duration::from_secs(3));
        let t0 = Instant::now();
        // Held 1s (100 samples), then released
        let events = feed(&mut c, t0, &levels(&[(Open, 5), (Closed, 100), (Open, 10)]));
        assert_eq!(events.len(), 1);
        let ButtonEvent::Press(p) = events[0] else {
            panic!("expected press, got {:?}", events[0]);
        };
        assert_eq!(p.kind, PressKind::Short);
        assert_eq!(p.started_at, t0 + TICK * 5);
        assert_eq!(p.duration, Some(Duration::from_secs(1)));
    }

    #[test]
    fn long_press_emitted_at_threshold_then_release() {
        let mut c = classifier(3, Duration::from_millis(500));
        let t0 = Instant::now();
        let all = levels(&[(Open, 2), (Closed, 80), (Open, 5)]);

        // Not yet at the threshold after 40 closed samples
        let before = feed(&mut c, t0, &all[..42]);
        assert!(before.is_empty());
        assert_eq!(c.stable, Closed);

        let rest: Vec<ButtonEvent> = all[42..]
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| c.update(l, t0 + TICK * (i as u32 + 42)))
            .collect();
        assert_eq!(rest.len(), 2);
        match rest[0] {
            ButtonEvent::Press(p) => {
                assert_eq!(p.kind, PressKind::Long);
                assert_eq!(p.duration, None);
            }
            other => panic!("expected long press, got {other:?}"),
        }
        assert_eq!(
            rest[1],
            ButtonEvent::Release {
                held: Duration::from_millis(800)
            }
        );
        assert_eq!(c.stable, Open);
    }

    #[test]
    fn flicker_shorter_than_window_is_ignored() {
        let mut c = classifier(3, Duration::from_secs(3));
        let t0 = Instant::now();
        let events = feed(
            &mut c,
            t0,
            &levels(&[(Open, 3), (Closed, 2), (Open, 3), (Closed, 1), (Open, 5)]),
        );
        assert!(events.is_empty());
        assert_eq!(c.stable, Open);
    }

    #[test]
    fn release_bounce_does_not_end_press() {
        let mut c = classifier(3, Duration::from_secs(3));
        let t0 = Instant::now();
        let events = feed(
            &mut c,
            t0,
            &levels(&[(Closed, 10), (Open, 1), (Closed, 10), (Open, 3)]),
        );
        assert_eq!(events.len(), 1);
        let ButtonEvent::Press(p) = events[0] else {
            panic!("expected press");
        };
        // One press spanning the bounce: 21 samples from t0
        assert_eq!(p.duration, Some(TICK * 21));
    }

    #[test]
    fn release_started_before_threshold_stays_short() {
        // Contact opens 10ms before the threshold; the debounce window then
        // crosses it, but the press must still resolve as short.
        let mut c = classifier(3, Duration::from_millis(100));
        let t0 = Instant::now();
        let events = feed(&mut c, t0, &levels(&[(Closed, 9), (Open, 5)]));
        assert_eq!(events.len(), 1);
        let ButtonEvent::Press(p) = events[0] else {
            panic!("expected press");
        };
        assert_eq!(p.kind, PressKind::Short);
        assert_eq!(p.duration, Some(Duration::from_millis(90)));
    }

    #[test]
    fn threshold_update_applies_to_next_press() {
        let handle = ThresholdHandle::new(Duration::from_secs(3));
        let mut c = DebounceClassifier::new(1, handle.clone());
        handle.set(Duration::from_millis(50));
        let events = feed(&mut c, Instant::now(), &levels(&[(Closed, 10)]));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ButtonEvent::Press(PressEvent {
                kind: PressKind::Long,
                ..
            })
        ));
    }

    #[test]
    fn one_sample_window_accepts_immediately() {
        let mut c = classifier(1, Duration::from_secs(3));
        assert_eq!(c.update(Closed, Instant::now()), None);
        assert_eq!(c.stable, Closed);
    }

    #[test]
    fn simulated_short_has_zero_duration() {
        let p = PressEvent::simulated(PressKind::Short);
        assert_eq!(p.duration, Some(Duration::ZERO));
        assert_eq!(PressEvent::simulated(PressKind::Long).duration, None);
    }
}

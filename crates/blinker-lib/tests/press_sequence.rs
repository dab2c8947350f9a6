//! Integration tests: press → sequence → dispatch → restoration flows.
//!
//! These run the real service threads against a MockEndpoint with shortened
//! timings, and drive presses either through the sampler (scripted input
//! line) or through simulated injection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use blinker_lib::config::Config;
use blinker_lib::debounce::{ButtonEvent, DebounceClassifier, PressKind, ThresholdHandle};
use blinker_lib::endpoint::mock::MockEndpoint;
use blinker_lib::endpoint::{self, DeviceInfo, EndpointError, LightingEndpoint};
use blinker_lib::health::Connectivity;
use blinker_lib::input::mock::ScriptedPin;
use blinker_lib::input::{ButtonLine, Contact, run_sampler};
use blinker_lib::led::{Color, FX_SOLID, IdleMode, LedCommand, parse_color};
use blinker_lib::sequence::SequenceState;
use blinker_lib::service::{EndpointFactory, Service};
use blinker_lib::shutdown::Shutdown;

fn mock_factory(endpoint: Arc<MockEndpoint>) -> EndpointFactory {
    Box::new(move |_| Ok(endpoint.clone() as Arc<dyn LightingEndpoint>))
}

fn fast_config() -> Config {
    Config {
        long_press_threshold: 3.0,
        short_flash_duration: 0.15,
        flash_interval: 0.04,
        retry_delay: 0.01,
        reconnect_delay: 0.01,
        max_failed_attempts: 2,
        ..Config::default()
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn started(endpoint: &Arc<MockEndpoint>, config: Config) -> Service {
    let service = Service::start(config, mock_factory(endpoint.clone()), Shutdown::new()).unwrap();
    assert!(service.wait_until_available(Duration::from_secs(2)));
    assert!(service.sequence().wait_settled(Duration::from_secs(2)));
    service
}

// ── Classification ──

#[test]
fn one_second_hold_is_one_short_press() {
    let mut classifier = DebounceClassifier::new(3, ThresholdHandle::new(Duration::from_secs(3)));
    let t0 = Instant::now();
    let tick = Duration::from_millis(10);
    let mut levels = vec![Contact::Open; 3];
    levels.extend(std::iter::repeat_n(Contact::Closed, 100));
    levels.extend(std::iter::repeat_n(Contact::Open, 5));

    let events: Vec<ButtonEvent> = levels
        .iter()
        .enumerate()
        .filter_map(|(i, &l)| classifier.update(l, t0 + tick * i as u32))
        .collect();

    assert_eq!(events.len(), 1);
    match events[0] {
        ButtonEvent::Press(p) => {
            assert_eq!(p.kind, PressKind::Short);
            assert_eq!(p.duration, Some(Duration::from_secs(1)));
        }
        other => panic!("expected a short press, got {other:?}"),
    }
}

// ── End-to-end ──

#[test]
fn startup_restores_idle_exactly_once() {
    let endpoint = Arc::new(MockEndpoint::new());
    let service = started(&endpoint, fast_config());

    let white = parse_color("white").unwrap();
    assert_eq!(endpoint.sent().len(), 1);
    assert_eq!(endpoint.sent()[0].color(), Some(white));
    assert_eq!(service.link().restorations(), 1);
    assert_eq!(service.health().status, Connectivity::Healthy);
}

#[test]
fn physical_short_press_flashes_then_idles() {
    let endpoint = Arc::new(MockEndpoint::new());
    let service = started(&endpoint, fast_config());
    endpoint.clear_sent();

    // 150 ms closed contact, then open forever
    let mut line = ButtonLine::new(ScriptedPin::press(15), true);
    let mut classifier = service.classifier();
    let shutdown = Shutdown::new();
    let mut presses = 0;
    let result = run_sampler(&mut line, &mut classifier, &shutdown, |event| {
        if matches!(event, ButtonEvent::Press(_)) {
            presses += 1;
            shutdown.trigger();
        }
        service.handle_event(event);
    });
    assert!(result.is_ok());
    assert_eq!(presses, 1);
    assert!(matches!(service.state(), SequenceState::ShortActive { .. }));

    std::thread::sleep(Duration::from_millis(20));
    assert!(service.sequence().wait_settled(Duration::from_secs(2)));

    let sent = endpoint.sent();
    let blue = Color::Rgbw([0, 0, 255, 0]);
    assert_eq!(sent[0].color(), Some(blue));
    assert!(sent.len() >= 3, "expected flash frames, got {sent:?}");
    assert_eq!(sent.last(), Some(&service.sequence().last_known()));
    assert_eq!(service.health().button_press_count, 1);
}

#[test]
fn long_press_overrides_short_and_ignores_shorts() {
    let endpoint = Arc::new(MockEndpoint::new());
    let config = Config {
        short_flash_duration: 5.0,
        long_press_threshold: 0.2,
        default_mode: IdleMode::Effect,
        ..fast_config()
    };
    let service = started(&endpoint, config);
    endpoint.clear_sent();

    service.inject(PressKind::Short);
    assert!(matches!(service.state(), SequenceState::ShortActive { .. }));
    service.inject(PressKind::Long);
    assert!(matches!(service.state(), SequenceState::LongActive { .. }));
    service.inject(PressKind::Short);
    assert!(matches!(service.state(), SequenceState::LongActive { .. }));

    assert!(wait_until(Duration::from_secs(3), || service.state().is_idle()));
    assert!(service.sequence().wait_settled(Duration::from_secs(2)));

    let idle = service.sequence().last_known();
    let sent = endpoint.sent();
    // Only the long sequence's end produced the idle command
    assert_eq!(sent.iter().filter(|c| **c == idle).count(), 1);
    assert_eq!(sent.last(), Some(&idle));
    assert!(sent.iter().any(|c| c.color() == Some(Color::Rgbw([255, 0, 0, 0]))));
    assert_eq!(service.health().button_press_count, 3);
}

#[test]
fn outage_goes_critical_then_recovers_and_restores() {
    let endpoint = Arc::new(MockEndpoint::new());
    let service = started(&endpoint, fast_config());

    endpoint.fail_all();
    service.inject(PressKind::Short);
    assert!(wait_until(Duration::from_secs(2), || {
        service.health().status == Connectivity::Critical
    }));
    assert!(!service.is_available());
    let snapshot = service.health();
    assert!(snapshot.failed_attempts >= 2);
    assert!(snapshot.last_error.is_some());

    // The sequence keeps running on its own clock while the link is down
    assert!(wait_until(Duration::from_secs(2), || service.state().is_idle()));

    endpoint.clear_sent();
    endpoint.heal();
    assert!(service.wait_until_available(Duration::from_secs(3)));
    assert!(wait_until(Duration::from_secs(2), || service.link().restorations() == 2));

    let snapshot = service.health();
    assert_eq!(snapshot.status, Connectivity::Healthy);
    assert_eq!(snapshot.failed_attempts, 0);
    assert!(snapshot.last_error.is_none());
    assert_eq!(endpoint.sent(), vec![service.sequence().last_known()]);
}

#[test]
fn effects_are_cached_through_the_service() {
    let endpoint = Arc::new(MockEndpoint::new());
    let service = started(&endpoint, fast_config());
    endpoint.set_effects(vec!["Solid".into(), "Rainbow".into()]);

    let first = service.effects();
    let second = service.effects();
    assert_eq!(*first, vec!["Solid".to_string(), "Rainbow".to_string()]);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(endpoint.effect_calls(), 1);
}

/// Times out on non-solid effect commands (the idle effect) a set number of
/// times and passes everything else through.
struct IdleRefusingEndpoint {
    inner: MockEndpoint,
    refusals: AtomicUsize,
}

impl LightingEndpoint for IdleRefusingEndpoint {
    fn send_state(&self, command: &LedCommand) -> endpoint::Result<()> {
        if command.fx() != Some(FX_SOLID)
            && self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(EndpointError::Http("operation timed out".into()));
        }
        self.inner.send_state(command)
    }

    fn fetch_info(&self) -> endpoint::Result<DeviceInfo> {
        self.inner.fetch_info()
    }

    fn fetch_effects(&self) -> endpoint::Result<Vec<String>> {
        self.inner.fetch_effects()
    }
}

#[test]
fn idle_command_retried_after_failures_below_threshold() {
    let endpoint = Arc::new(IdleRefusingEndpoint {
        inner: MockEndpoint::new(),
        refusals: AtomicUsize::new(0),
    });
    let factory: EndpointFactory = {
        let endpoint = endpoint.clone();
        Box::new(move |_| Ok(endpoint.clone() as Arc<dyn LightingEndpoint>))
    };
    // Three retries per dispatch stay below the critical threshold of five
    let config = Config {
        default_mode: IdleMode::Effect,
        max_retries: 3,
        max_failed_attempts: 5,
        ..fast_config()
    };
    let service = Service::start(config, factory, Shutdown::new()).unwrap();
    assert!(service.wait_until_available(Duration::from_secs(2)));
    assert!(service.sequence().wait_settled(Duration::from_secs(2)));

    endpoint.inner.clear_sent();
    endpoint.refusals.store(3, Ordering::SeqCst);
    service.inject(PressKind::Short);
    std::thread::sleep(Duration::from_millis(20));
    assert!(service.sequence().wait_settled(Duration::from_secs(3)));

    let idle = service.sequence().last_known();
    assert_eq!(endpoint.refusals.load(Ordering::SeqCst), 0);
    assert_eq!(endpoint.inner.sent().last(), Some(&idle));
    assert!(service.is_available());
    assert_eq!(service.health().status, Connectivity::Healthy);
    assert_eq!(service.link().restorations(), 1);
}

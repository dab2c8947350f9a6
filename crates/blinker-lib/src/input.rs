//! Input line sampling over `embedded_hal` input pins.
//!
//! On Linux the button is read through the GPIO character device
//! (`/dev/gpiochipN`) with `linux-embedded-hal`'s `CdevPin`. Line offsets
//! are chip-relative, so BCM numbering works regardless of the chip base the
//! kernel assigns.

use std::fmt;
use std::time::{Duration, Instant};

pub use embedded_hal::digital::InputPin;

use crate::debounce::{ButtonEvent, DebounceClassifier};
use crate::shutdown::Shutdown;

/// Fixed sampling interval of the input line.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// GPIO character device holding the header pins on a Raspberry Pi.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

// ── Error type ──

/// Input line faults. Both variants are fatal: the process cannot keep
/// classifying presses without a trustworthy line.
#[derive(Debug)]
pub enum InputError {
    Unavailable(String),
    ReadFailed(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Unavailable(e) => write!(f, "Input line unavailable: {e}"),
            InputError::ReadFailed(e) => write!(f, "Input read failed: {e}"),
        }
    }
}

impl std::error::Error for InputError {}

pub type Result<T> = std::result::Result<T, InputError>;

// ── Contact level ──

/// Logical state of the contact, after active-low translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    Open,
    Closed,
}

// ── Button line ──

/// A button wired to an input pin.
pub struct ButtonLine<P> {
    pin: P,
    active_low: bool,
}

impl<P: InputPin> ButtonLine<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    pub fn read(&mut self) -> Result<Contact> {
        let low = self
            .pin
            .is_low()
            .map_err(|e| InputError::ReadFailed(format!("{e:?}")))?;
        Ok(if low == self.active_low {
            Contact::Closed
        } else {
            Contact::Open
        })
    }
}

/// Request line `offset` of `chip` as an input.
///
/// The first read happens here so a miswired or busy line fails at startup
/// rather than on the first poll.
#[cfg(target_os = "linux")]
pub fn open_gpio(
    chip: &std::path::Path,
    offset: u32,
    active_low: bool,
) -> Result<ButtonLine<linux_embedded_hal::CdevPin>> {
    use linux_embedded_hal::CdevPin;
    use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};

    let unavailable =
        |e: &dyn fmt::Display| InputError::Unavailable(format!("{} line {offset}: {e}", chip.display()));

    let mut gpio = Chip::new(chip).map_err(|e| unavailable(&e))?;
    let handle = gpio
        .get_line(offset)
        .and_then(|line| line.request(LineRequestFlags::INPUT, 0, "blinker"))
        .map_err(|e| unavailable(&e))?;
    let pin = CdevPin::new(handle).map_err(|e| unavailable(&e))?;

    let mut line = ButtonLine::new(pin, active_low);
    line.read()?;
    Ok(line)
}

// ── Sampling loop ──

/// Poll `line` every [`POLL_INTERVAL`] until shutdown, feeding the classifier
/// and forwarding every classified event to `sink`.
///
/// Returns the first read failure; the caller must treat it as fatal.
pub fn run_sampler<P: InputPin>(
    line: &mut ButtonLine<P>,
    classifier: &mut DebounceClassifier,
    shutdown: &Shutdown,
    mut sink: impl FnMut(ButtonEvent),
) -> Result<()> {
    while !shutdown.is_triggered() {
        let contact = line.read()?;
        if let Some(event) = classifier.update(contact, Instant::now()) {
            sink(event);
        }
        if shutdown.wait(POLL_INTERVAL) {
            break;
        }
    }
    Ok(())
}

// ── Test stub ──

/// Scriptable [`InputPin`] for unit and integration tests.
///
/// The script is written as contact states of an active-low button, so
/// `Closed` reads low. When the script is exhausted the last level repeats.
/// `fail_at` makes the n-th read (0-based) fail.
#[doc(hidden)]
pub mod mock {
    use embedded_hal::digital::{ErrorKind, ErrorType, InputPin};

    use super::Contact;

    #[derive(Debug)]
    pub struct InjectedFault;

    impl embedded_hal::digital::Error for InjectedFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    pub struct ScriptedPin {
        script: Vec<Contact>,
        pos: usize,
        fail_at: Option<usize>,
    }

    impl ScriptedPin {
        pub fn new(script: Vec<Contact>) -> Self {
            Self {
                script,
                pos: 0,
                fail_at: None,
            }
        }

        /// `closed` samples of a pressed contact followed by open forever.
        pub fn press(closed: usize) -> Self {
            let mut script = vec![Contact::Open; 2];
            script.extend(std::iter::repeat_n(Contact::Closed, closed));
            script.push(Contact::Open);
            Self::new(script)
        }

        pub fn fail_at(mut self, read: usize) -> Self {
            self.fail_at = Some(read);
            self
        }

        pub fn reads(&self) -> usize {
            self.pos
        }

        fn next(&mut self) -> Result<Contact, InjectedFault> {
            let n = self.pos;
            self.pos += 1;
            if self.fail_at == Some(n) {
                return Err(InjectedFault);
            }
            Ok(self
                .script
                .get(n)
                .or_else(|| self.script.last())
                .copied()
                .unwrap_or(Contact::Open))
        }
    }

    impl ErrorType for ScriptedPin {
        type Error = InjectedFault;
    }

    impl InputPin for ScriptedPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.next()? == Contact::Open)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.next()? == Contact::Closed)
        }
    }
}

//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::led::IdleMode;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str =
    "# Blinker configuration. Changes made outside the app may be overwritten.\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// BCM GPIO number of the button input. Changing it requires a restart.
    #[serde(default = "default_input_pin")]
    pub input_pin: u32,

    /// GPIO character device the input line belongs to.
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,

    /// Button pulls the line low when pressed (pull-up wiring).
    #[serde(default = "default_true")]
    pub active_low: bool,

    /// Consecutive identical samples (10 ms apart) needed to accept an edge.
    #[serde(default = "default_debounce_samples")]
    pub debounce_samples: u32,

    /// WLED host: IP address or host name, optionally with `:port`.
    #[serde(default = "default_wled_address")]
    pub wled_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wled_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wled_password: Option<String>,

    /// Seconds a press must be held to count as long.
    #[serde(default = "default_long_press_threshold")]
    pub long_press_threshold: f64,

    /// Seconds the short-press sequence flashes.
    #[serde(default = "default_short_flash_duration")]
    pub short_flash_duration: f64,

    /// Seconds per full flash cycle.
    #[serde(default = "default_flash_interval")]
    pub flash_interval: f64,

    #[serde(default = "default_brightness")]
    pub flash_brightness: i64,

    /// Crossfade seconds for the idle command.
    #[serde(default)]
    pub transition_time: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: f64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Consecutive failures before the link is considered critical.
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default = "default_mode")]
    pub default_mode: IdleMode,

    #[serde(default = "default_effect_index")]
    pub default_effect_index: i64,

    #[serde(default = "default_effect_level")]
    pub default_effect_speed: i64,

    #[serde(default = "default_effect_level")]
    pub default_effect_intensity: i64,

    /// The two colors alternated by the short-press sequence.
    #[serde(default = "default_short_colors")]
    pub short_colors: [String; 2],

    /// The two colors alternated while a long press is held.
    #[serde(default = "default_long_colors")]
    pub long_colors: [String; 2],

    /// Log file for `run`. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

fn default_input_pin() -> u32 {
    18
}
fn default_gpio_chip() -> String {
    crate::input::DEFAULT_GPIO_CHIP.into()
}
fn default_true() -> bool {
    true
}
fn default_debounce_samples() -> u32 {
    3
}
fn default_wled_address() -> String {
    "192.168.1.15".into()
}
fn default_long_press_threshold() -> f64 {
    3.0
}
fn default_short_flash_duration() -> f64 {
    5.0
}
fn default_flash_interval() -> f64 {
    0.5
}
fn default_brightness() -> i64 {
    255
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_reconnect_delay() -> f64 {
    5.0
}
fn default_request_timeout() -> f64 {
    5.0
}
fn default_max_failed_attempts() -> u32 {
    5
}
fn default_mode() -> IdleMode {
    IdleMode::White
}
fn default_effect_index() -> i64 {
    162
}
fn default_effect_level() -> i64 {
    128
}
fn default_short_colors() -> [String; 2] {
    ["#0000FF00".into(), "#000000FF".into()]
}
fn default_long_colors() -> [String; 2] {
    ["#FF000000".into(), "#00000000".into()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_pin: default_input_pin(),
            gpio_chip: default_gpio_chip(),
            active_low: true,
            debounce_samples: default_debounce_samples(),
            wled_address: default_wled_address(),
            wled_username: None,
            wled_password: None,
            long_press_threshold: default_long_press_threshold(),
            short_flash_duration: default_short_flash_duration(),
            flash_interval: default_flash_interval(),
            flash_brightness: default_brightness(),
            transition_time: 0.0,
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            reconnect_delay: default_reconnect_delay(),
            request_timeout: default_request_timeout(),
            max_failed_attempts: default_max_failed_attempts(),
            default_mode: default_mode(),
            default_effect_index: default_effect_index(),
            default_effect_speed: default_effect_level(),
            default_effect_intensity: default_effect_level(),
            short_colors: default_short_colors(),
            long_colors: default_long_colors(),
            log_file: String::new(),
        }
    }
}

/// Convert a seconds value from the config into a `Duration`.
///
/// Negative, NaN and overflowing values become zero; [`Config::validate`]
/// rejects all of them, together with anything past [`MAX_SECONDS`].
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Largest accepted value for any seconds field (one day).
pub const MAX_SECONDS: f64 = 86_400.0;

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `wled_address` is neither an IP address nor a valid host name.
    InvalidAddress(String),
    /// A numeric field is outside its allowed range.
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    /// A color field could not be parsed.
    InvalidColor { field: &'static str, reason: String },
    /// The log file's directory does not exist.
    InvalidLogFile(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidAddress(a) => write!(f, "Invalid WLED address: {a}"),
            ValidationError::OutOfRange {
                field,
                value,
                expected,
            } => write!(f, "Invalid {field}: {value} (expected {expected})"),
            ValidationError::InvalidColor { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
            ValidationError::InvalidLogFile(e) => write!(f, "Invalid log_file: {e}"),
        }
    }
}

/// Host name per RFC 1123: dot-separated labels of letters, digits and hyphens.
fn is_host_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Accept `ip`, `host`, `ip:port` or `host:port`, with an optional http(s) scheme.
pub fn is_valid_address(address: &str) -> bool {
    let a = address.trim();
    let a = a
        .strip_prefix("http://")
        .or_else(|| a.strip_prefix("https://"))
        .unwrap_or(a)
        .trim_end_matches('/');
    if a.parse::<IpAddr>().is_ok() {
        return true;
    }
    let host = match a.rsplit_once(':') {
        Some((host, port)) => {
            if port.parse::<u16>().is_err() {
                return false;
            }
            host
        }
        None => a,
    };
    host.parse::<IpAddr>().is_ok() || is_host_name(host)
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("blinker"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to warn that manual edits may be overwritten.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !is_valid_address(&self.wled_address) {
            errors.push(ValidationError::InvalidAddress(self.wled_address.clone()));
        }

        let mut int_range = |field: &'static str, value: i64, lo: i64, hi: i64, expected| {
            if !(lo..=hi).contains(&value) {
                errors.push(ValidationError::OutOfRange {
                    field,
                    value: value.to_string(),
                    expected,
                });
            }
        };
        int_range("input_pin", i64::from(self.input_pin), 0, 27, "0-27");
        int_range("flash_brightness", self.flash_brightness, 0, 255, "0-255");
        int_range("default_effect_speed", self.default_effect_speed, 0, 255, "0-255");
        int_range("default_effect_intensity", self.default_effect_intensity, 0, 255, "0-255");
        int_range("default_effect_index", self.default_effect_index, 0, 200, "0-200");
        int_range("max_retries", i64::from(self.max_retries), 1, i64::MAX, ">= 1");
        int_range("max_failed_attempts", i64::from(self.max_failed_attempts), 1, i64::MAX, ">= 1");
        int_range("debounce_samples", i64::from(self.debounce_samples), 1, i64::MAX, ">= 1");

        let positive = [
            ("long_press_threshold", self.long_press_threshold),
            ("short_flash_duration", self.short_flash_duration),
            ("flash_interval", self.flash_interval),
            ("retry_delay", self.retry_delay),
            ("reconnect_delay", self.reconnect_delay),
            ("request_timeout", self.request_timeout),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0 && value <= MAX_SECONDS) {
                errors.push(ValidationError::OutOfRange {
                    field,
                    value: value.to_string(),
                    expected: "> 0 and <= 86400 seconds",
                });
            }
        }
        if !(self.transition_time.is_finite()
            && (0.0..=MAX_SECONDS).contains(&self.transition_time))
        {
            errors.push(ValidationError::OutOfRange {
                field: "transition_time",
                value: self.transition_time.to_string(),
                expected: "0-86400 seconds",
            });
        }

        if self.gpio_chip.trim().is_empty() {
            errors.push(ValidationError::OutOfRange {
                field: "gpio_chip",
                value: String::new(),
                expected: "a GPIO character device path",
            });
        }

        for (field, colors) in [
            ("short_colors", &self.short_colors),
            ("long_colors", &self.long_colors),
        ] {
            for c in colors {
                if let Err(e) = crate::led::parse_color(c) {
                    errors.push(ValidationError::InvalidColor {
                        field,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !self.log_file.trim().is_empty()
            && let Some(dir) = Path::new(self.log_file.trim()).parent()
            && !dir.as_os_str().is_empty()
            && !dir.is_dir()
        {
            errors.push(ValidationError::InvalidLogFile(format!(
                "directory {} does not exist",
                dir.display()
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether the input sampling context must be restarted to apply `other`.
    pub fn input_changed(&self, other: &Config) -> bool {
        self.input_pin != other.input_pin
            || self.gpio_chip != other.gpio_chip
            || self.active_low != other.active_low
            || self.debounce_samples != other.debounce_samples
    }

    /// Whether `other` needs a new endpoint client.
    pub fn endpoint_changed(&self, other: &Config) -> bool {
        self.wled_address != other.wled_address
            || self.wled_username != other.wled_username
            || self.wled_password != other.wled_password
            || self.request_timeout != other.request_timeout
    }
}

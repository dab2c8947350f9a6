//! Lighting endpoint abstraction and the WLED HTTP adapter.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::led::LedCommand;

// ── Error type ──

/// One failed exchange with the lighting endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointError {
    /// Transport failure (connect, timeout, TLS, client construction).
    Http(String),
    /// The device answered with a non-200 status.
    Status(u16),
    /// The response body could not be decoded.
    Decode(String),
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointError::Http(e) => write!(f, "WLED request failed: {e}"),
            EndpointError::Status(code) => write!(f, "WLED returned HTTP {code}"),
            EndpointError::Decode(e) => write!(f, "WLED response invalid: {e}"),
        }
    }
}

impl std::error::Error for EndpointError {}

pub type Result<T> = std::result::Result<T, EndpointError>;

// ── Device info ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedInfo {
    #[serde(default)]
    pub count: u32,
}

/// Subset of `/json/info` used for probing and status output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "ver")]
    pub version: String,
    #[serde(default)]
    pub leds: LedInfo,
}

// ── Trait ──

/// Capability interface of the downstream lighting controller.
pub trait LightingEndpoint: Send + Sync {
    fn send_state(&self, command: &LedCommand) -> Result<()>;
    fn fetch_info(&self) -> Result<DeviceInfo>;
    /// Effect names; the index is the effect id used in `fx`.
    fn fetch_effects(&self) -> Result<Vec<String>>;
}

// ── WLED HTTP ──

/// Blocking HTTP client for the WLED JSON API.
pub struct WledHttp {
    base: String,
    client: reqwest::blocking::Client,
    auth: Option<(String, String)>,
}

impl WledHttp {
    pub fn new(
        address: &str,
        timeout: Duration,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EndpointError::Http(e.to_string()))?;
        let address = address.trim().trim_end_matches('/');
        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let auth = username
            .filter(|u| !u.is_empty())
            .map(|u| (u, password.unwrap_or_default()));
        Ok(WledHttp { base, client, auth })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.wled_address,
            crate::config::seconds(config.request_timeout),
            config.wled_username.clone(),
            config.wled_password.clone(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .map_err(|e| EndpointError::Http(e.to_string()))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EndpointError::Status(status.as_u16()));
        }
        response
            .json::<T>()
            .map_err(|e| EndpointError::Decode(e.to_string()))
    }
}

impl LightingEndpoint for WledHttp {
    fn send_state(&self, command: &LedCommand) -> Result<()> {
        let url = format!("{}/json/state", self.base);
        let response = self
            .authorized(self.client.post(&url).json(command))
            .send()
            .map_err(|e| EndpointError::Http(e.to_string()))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EndpointError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn fetch_info(&self) -> Result<DeviceInfo> {
        self.get_json("/json/info")
    }

    fn fetch_effects(&self) -> Result<Vec<String>> {
        self.get_json("/json/effects")
    }
}

// ── Mock endpoint ──

/// In-memory [`LightingEndpoint`] for tests.
///
/// Failures are scripted as countdowns: `fail_sends(3)` makes the next three
/// `send_state` calls fail. `fail_all()` fails everything until `heal()`.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::PoisonError;

    #[derive(Debug, Default)]
    struct State {
        sent: Vec<LedCommand>,
        send_calls: usize,
        info_calls: usize,
        effect_calls: usize,
        fail_sends: usize,
        fail_infos: usize,
        fail_effects: usize,
        down: bool,
        effects: Vec<String>,
    }

    #[derive(Debug)]
    pub struct MockEndpoint {
        state: Mutex<State>,
    }

    impl Default for MockEndpoint {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEndpoint {
        pub fn new() -> Self {
            MockEndpoint {
                state: Mutex::new(State {
                    effects: vec!["Solid".into(), "Blink".into(), "Breathe".into()],
                    ..State::default()
                }),
            }
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn fail_sends(&self, n: usize) {
            self.lock().fail_sends = n;
        }

        pub fn fail_infos(&self, n: usize) {
            self.lock().fail_infos = n;
        }

        pub fn fail_effects(&self, n: usize) {
            self.lock().fail_effects = n;
        }

        /// Fail every call until [`heal`](Self::heal).
        pub fn fail_all(&self) {
            self.lock().down = true;
        }

        pub fn heal(&self) {
            let mut s = self.lock();
            s.down = false;
            s.fail_sends = 0;
            s.fail_infos = 0;
            s.fail_effects = 0;
        }

        pub fn set_effects(&self, effects: Vec<String>) {
            self.lock().effects = effects;
        }

        /// Commands that were delivered successfully, in order.
        pub fn sent(&self) -> Vec<LedCommand> {
            self.lock().sent.clone()
        }

        pub fn clear_sent(&self) {
            self.lock().sent.clear();
        }

        pub fn send_calls(&self) -> usize {
            self.lock().send_calls
        }

        pub fn info_calls(&self) -> usize {
            self.lock().info_calls
        }

        pub fn effect_calls(&self) -> usize {
            self.lock().effect_calls
        }
    }

    fn take_failure(counter: &mut usize, down: bool) -> bool {
        if down {
            return true;
        }
        if *counter > 0 {
            *counter -= 1;
            return true;
        }
        false
    }

    impl LightingEndpoint for MockEndpoint {
        fn send_state(&self, command: &LedCommand) -> Result<()> {
            let mut s = self.lock();
            s.send_calls += 1;
            let down = s.down;
            if take_failure(&mut s.fail_sends, down) {
                return Err(EndpointError::Http("mock: connection refused".into()));
            }
            s.sent.push(command.clone());
            Ok(())
        }

        fn fetch_info(&self) -> Result<DeviceInfo> {
            let mut s = self.lock();
            s.info_calls += 1;
            let down = s.down;
            if take_failure(&mut s.fail_infos, down) {
                return Err(EndpointError::Http("mock: connection refused".into()));
            }
            Ok(DeviceInfo {
                name: "mock".into(),
                version: "0.0.0".into(),
                leds: LedInfo { count: 30 },
            })
        }

        fn fetch_effects(&self) -> Result<Vec<String>> {
            let mut s = self.lock();
            s.effect_calls += 1;
            let down = s.down;
            if take_failure(&mut s.fail_effects, down) {
                return Err(EndpointError::Status(503));
            }
            Ok(s.effects.clone())
        }
    }
}

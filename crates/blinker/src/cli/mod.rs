//! CLI subcommands — controller loop, probes and simulated presses.

mod config_cmd;
mod effects;
mod run;
mod simulate;
mod status;

use std::path::{Path, PathBuf};

use clap::{Subcommand, ValueEnum};
use serde::Serialize;

pub(super) use blinker_lib::config::{self, Config};
pub(super) use blinker_lib::debounce::PressKind;
pub(super) use blinker_lib::endpoint::{DeviceInfo, LightingEndpoint, WledHttp};
pub(super) use blinker_lib::error::{BlinkerError, Result};
pub(super) use blinker_lib::health::HealthSnapshot;
pub(super) use blinker_lib::led;
pub(super) use blinker_lib::sequence::SequenceState;
pub(super) use blinker_lib::service::{Service, http_factory};
pub(super) use blinker_lib::shutdown::Shutdown;

const PADDING: usize = 2;

/// Placeholder printed instead of a configured password.
const MASKED: &str = "********";

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Load the config from `custom_path` or the platform default, logging parse warnings.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let (config, warnings) = match custom_path {
        Some(path) => Config::load_from(path),
        None => Config::load_with_warnings(),
    };
    for w in &warnings {
        log::warn!("[config] {w}");
    }
    config
}

/// The config file in effect: `--config` override or the platform default.
pub(super) fn config_file(custom_path: Option<&Path>) -> Option<PathBuf> {
    custom_path.map(Path::to_path_buf).or_else(Config::path)
}

/// Log file named in the config, if any. Read before logging is initialised,
/// so parse problems are left for `load_config` to report.
pub fn configured_log_file(custom_path: Option<&Path>) -> Option<PathBuf> {
    let path = config_file(custom_path)?;
    let (config, _) = Config::load_from(&path);
    (!config.log_file.is_empty()).then(|| PathBuf::from(config.log_file))
}

/// Copy of `config` that is safe to print.
pub(super) fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.wled_password.is_some() {
        shown.wled_password = Some(MASKED.into());
    }
    shown
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub valid: bool,
    pub errors: Vec<String>,
    pub settings: Config,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub wled: WledStatusJson,
}

#[derive(Serialize)]
pub(super) struct WledStatusJson {
    pub url: String,
    pub reachable: bool,
    pub device: Option<DeviceStatusJson>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub(super) struct DeviceStatusJson {
    pub name: String,
    pub firmware: String,
    pub led_count: u32,
}

impl From<&DeviceInfo> for DeviceStatusJson {
    fn from(info: &DeviceInfo) -> Self {
        DeviceStatusJson {
            name: info.name.clone(),
            firmware: info.version.clone(),
            led_count: info.leds.count,
        }
    }
}

#[derive(Serialize)]
pub(super) struct EffectsOutput {
    pub count: usize,
    pub default_index: i64,
    pub effects: Vec<EffectJson>,
}

#[derive(Serialize)]
pub(super) struct EffectJson {
    pub index: usize,
    pub name: String,
}

#[derive(Serialize)]
pub(super) struct SimulateOutput {
    pub press: String,
    pub restorations: u64,
    pub health: HealthSnapshot,
}

/// Press kind accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Press {
    Short,
    Long,
}

impl From<Press> for PressKind {
    fn from(p: Press) -> Self {
        match p {
            Press::Short => PressKind::Short,
            Press::Long => PressKind::Long,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the controller: sample the button and drive the WLED device
    Run {
        /// Append log output to this file instead of stderr
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,
    },

    /// Show current configuration and file path
    Config {
        /// Write a config file with the defaults first, unless one exists
        #[arg(long)]
        init: bool,
    },

    /// Probe the WLED device once and report its status
    Status,

    /// List the effects offered by the WLED device
    Effects,

    /// Play one simulated press against the device and exit when idle again
    Simulate {
        #[arg(value_enum)]
        kind: Press,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(
    cmd: Command,
    json: bool,
    config_path: Option<&Path>,
    shutdown: &Shutdown,
) -> Result<()> {
    match cmd {
        Command::Run { .. } => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path, shutdown)
        }
        Command::Config { init } => {
            if init {
                config_cmd::init_config(json, config_path)?;
            }
            config_cmd::cmd_config(json, config_path)
        }
        Command::Status => status::cmd_status(json, config_path),
        Command::Effects => effects::cmd_effects(json, config_path),
        Command::Simulate { kind } => {
            simulate::cmd_simulate(kind.into(), json, config_path, shutdown)
        }
    }
}


#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn redacted_masks_password_only() {
        let config = Config {
            wled_username: Some("admin".into()),
            wled_password: Some("hunter2".into()),
            ..Config::default()
        };
        let shown = redacted(&config);
        assert_eq!(shown.wled_username.as_deref(), Some("admin"));
        assert_eq!(shown.wled_password.as_deref(), Some(MASKED));
    }

    #[test]
    fn redacted_leaves_missing_password_missing() {
        assert_eq!(redacted(&Config::default()).wled_password, None);
    }

    #[test]
    fn load_config_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn configured_log_file_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(configured_log_file(Some(&path)), None);

        let config = Config {
            log_file: "/tmp/blinker.log".into(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(
            configured_log_file(Some(&path)),
            Some(PathBuf::from("/tmp/blinker.log"))
        );
    }

    #[test]
    fn press_maps_to_kind() {
        assert_eq!(PressKind::from(Press::Short), PressKind::Short);
        assert_eq!(PressKind::from(Press::Long), PressKind::Long);
    }
}

#[cfg(test)]
mod json_struct_tests {
    use super::*;

    #[test]
    fn status_output_unreachable() {
        let output = StatusOutput {
            version: "0.3.0".into(),
            wled: WledStatusJson {
                url: "http://192.168.1.15".into(),
                reachable: false,
                device: None,
                error: Some("WLED returned HTTP 500".into()),
            },
        };
        let parsed = serde_json::to_value(&output).unwrap();
        assert_eq!(parsed["wled"]["reachable"], false);
        assert!(parsed["wled"]["device"].is_null());
        assert_eq!(parsed["wled"]["error"], "WLED returned HTTP 500");
    }

    #[test]
    fn device_status_from_info() {
        let info = DeviceInfo {
            name: "Desk".into(),
            version: "0.14.0".into(),
            leds: blinker_lib::endpoint::LedInfo { count: 60 },
        };
        let json = serde_json::to_value(DeviceStatusJson::from(&info)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(json["firmware"], "0.14.0");
        assert_eq!(json["led_count"], 60);
    }

    #[test]
    fn effects_output_lists_indices() {
        let output = EffectsOutput {
            count: 2,
            default_index: 1,
            effects: vec![
                EffectJson {
                    index: 0,
                    name: "Solid".into(),
                },
                EffectJson {
                    index: 1,
                    name: "Blink".into(),
                },
            ],
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["effects"][1]["index"], 1);
        assert_eq!(json["effects"][1]["name"], "Blink");
    }

    #[test]
    fn config_output_has_expected_fields() {
        let output = ConfigOutput {
            config_file: None,
            config_file_exists: false,
            valid: true,
            errors: vec![],
            settings: Config::default(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 5);
        assert_eq!(json["settings"]["wled_address"], "192.168.1.15");
        assert_eq!(json["settings"]["default_mode"], "white");
    }
}

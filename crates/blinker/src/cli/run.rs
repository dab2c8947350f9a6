//! `run` subcommand — the long-lived controller.
//!
//! Samples the button on a dedicated thread, runs the service threads and
//! reads control commands from stdin until Ctrl+C, `quit` or an input fault.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use blinker_lib::debounce::ButtonEvent;
use blinker_lib::input::{self, ButtonLine, InputError, InputPin};

use super::{
    BlinkerError, Config, PressKind, Result, SequenceState, Service, Shutdown, config_file,
    http_factory, kv, kv_width,
};

/// One line typed on the control console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Press(PressKind),
    Status,
    Effects,
    Reload,
    Quit,
    Help,
}

const CONSOLE_HELP: &str = "commands: short, long, status, effects, reload, quit";

/// Parse a console line. `None` for anything unrecognised.
fn parse_console(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_lowercase().as_str() {
        "s" | "short" => Some(ConsoleCommand::Press(PressKind::Short)),
        "l" | "long" => Some(ConsoleCommand::Press(PressKind::Long)),
        "status" => Some(ConsoleCommand::Status),
        "effects" | "fx" => Some(ConsoleCommand::Effects),
        "reload" => Some(ConsoleCommand::Reload),
        "q" | "quit" | "exit" => Some(ConsoleCommand::Quit),
        "h" | "help" | "?" => Some(ConsoleCommand::Help),
        _ => None,
    }
}

fn print_status(service: &Service) {
    let health = service.health();
    let state = service.state();
    let w = kv_width(
        &["Link:", "Sequence:", "Presses:", "Failures:", "Last success:", "Last error:", "Device:"],
        &[],
    );
    kv("Link:", health.status, w);
    let since = match state {
        SequenceState::Idle => String::new(),
        SequenceState::ShortActive { started_at } | SequenceState::LongActive { started_at } => {
            format!(" ({:.1} s)", started_at.elapsed().as_secs_f64())
        }
    };
    kv("Sequence:", format_args!("{state}{since}"), w);
    kv("Presses:", health.button_press_count, w);
    kv("Failures:", health.failed_attempts, w);
    match health.last_successful_connection {
        Some(at) => kv("Last success:", at.format("%Y-%m-%d %H:%M:%S UTC"), w),
        None => kv("Last success:", "never", w),
    }
    if let Some(e) = &health.last_error {
        kv("Last error:", e, w);
    }
    if let Some(info) = service.link().device_info() {
        kv(
            "Device:",
            format_args!("{} (WLED {}, {} LEDs)", info.name, info.version, info.leds.count),
            w,
        );
    }
}

fn print_effects(service: &Service) {
    let effects = service.effects();
    if effects.is_empty() {
        println!("(no effects known; is the device reachable?)");
        return;
    }
    let default_index = service.config().default_effect_index;
    for (index, name) in effects.iter().enumerate() {
        let marker = if index as i64 == default_index { '*' } else { ' ' };
        println!("{marker} {index:>3}  {name}");
    }
}

/// Re-read the config file and apply it. A file that fails to parse is not applied.
fn reload(service: &Service, path: Option<&Path>) {
    let Some(path) = path else {
        println!("[config] no config file to reload");
        return;
    };
    let (config, warnings) = Config::load_from(path);
    if !warnings.is_empty() {
        for w in &warnings {
            println!("[config] {w}");
        }
        println!("[config] reload skipped, keeping current settings");
        return;
    }
    match service.apply_config(config) {
        Ok(()) => println!("[config] reloaded {}", path.display()),
        Err(e) => println!("[config] reload rejected: {e}"),
    }
}

/// Read console commands until EOF, `quit` or shutdown.
///
/// EOF only ends the console: under a supervisor stdin is usually closed
/// and the controller must keep running.
fn console_loop(service: &Service, shutdown: &Shutdown, config_path: Option<&Path>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if shutdown.is_triggered() {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_console(&line) {
            Some(ConsoleCommand::Press(kind)) => service.inject(kind),
            Some(ConsoleCommand::Status) => print_status(service),
            Some(ConsoleCommand::Effects) => print_effects(service),
            Some(ConsoleCommand::Reload) => reload(service, config_path),
            Some(ConsoleCommand::Quit) => {
                shutdown.trigger();
                break;
            }
            Some(ConsoleCommand::Help) => println!("{CONSOLE_HELP}"),
            None => println!("unknown command: {} ({CONSOLE_HELP})", line.trim()),
        }
    }
    log::debug!("console closed");
}

#[cfg(target_os = "linux")]
fn open_line(config: &Config) -> input::Result<ButtonLine<impl InputPin + Send + 'static>> {
    input::open_gpio(Path::new(&config.gpio_chip), config.input_pin, config.active_low)
}

#[cfg(not(target_os = "linux"))]
fn open_line(_config: &Config) -> input::Result<ButtonLine<input::mock::ScriptedPin>> {
    Err(InputError::Unavailable(
        "GPIO input requires the Linux character device".into(),
    ))
}

fn spawn_sampler<P: InputPin + Send + 'static>(
    mut line: ButtonLine<P>,
    service: Arc<Service>,
    shutdown: Shutdown,
) -> std::io::Result<JoinHandle<input::Result<()>>> {
    std::thread::Builder::new()
        .name("sampler".into())
        .spawn(move || {
            let mut classifier = service.classifier();
            let result = input::run_sampler(&mut line, &mut classifier, &shutdown, |event| {
                if let ButtonEvent::Release { held } = event {
                    log::debug!("released after {held:?}");
                }
                service.handle_event(event);
            });
            if let Err(e) = &result {
                log::error!("{e}");
                shutdown.trigger();
            }
            result
        })
}

fn spawn_console(
    service: Arc<Service>,
    shutdown: Shutdown,
    config_path: Option<PathBuf>,
) -> std::io::Result<()> {
    // Detached: a blocking stdin read cannot be interrupted
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || console_loop(&service, &shutdown, config_path.as_deref()))?;
    Ok(())
}

pub(super) fn cmd_run(custom_path: Option<&Path>, shutdown: &Shutdown) -> Result<()> {
    let config = super::load_config(custom_path);
    let path = config_file(custom_path);
    match &path {
        Some(p) if p.exists() => log::info!("config: {}", p.display()),
        _ => log::info!("config: defaults"),
    }

    // Validate and open the line first so a bad setup fails before any network traffic
    config.validate()?;
    let line = open_line(&config)?;
    log::info!(
        "button on {} line {} ({})",
        config.gpio_chip,
        config.input_pin,
        if config.active_low { "active low" } else { "active high" }
    );
    log::info!("WLED at {}", config.wled_address);

    let service = Arc::new(Service::start(config, http_factory(), shutdown.clone())?);
    let sampler = spawn_sampler(line, service.clone(), shutdown.clone())?;
    if let Err(e) = spawn_console(service.clone(), shutdown.clone(), path) {
        log::warn!("console unavailable: {e}");
    }
    println!("Running. {CONSOLE_HELP}. Press Ctrl+C to stop.");

    shutdown.wait(Duration::MAX);
    log::info!("shutting down");
    service.stop();

    match sampler.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BlinkerError::Input(e)),
        Err(_) => Err(BlinkerError::Input(InputError::ReadFailed(
            "sampler thread panicked".into(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_press_commands() {
        assert_eq!(
            parse_console("short"),
            Some(ConsoleCommand::Press(PressKind::Short))
        );
        assert_eq!(
            parse_console("  LONG \n"),
            Some(ConsoleCommand::Press(PressKind::Long))
        );
        assert_eq!(parse_console("s"), Some(ConsoleCommand::Press(PressKind::Short)));
    }

    #[test]
    fn parse_control_commands() {
        assert_eq!(parse_console("status"), Some(ConsoleCommand::Status));
        assert_eq!(parse_console("effects"), Some(ConsoleCommand::Effects));
        assert_eq!(parse_console("reload"), Some(ConsoleCommand::Reload));
        assert_eq!(parse_console("quit"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_console("exit"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_console("?"), Some(ConsoleCommand::Help));
    }

    #[test]
    fn parse_unknown_is_none() {
        assert_eq!(parse_console("flash"), None);
        assert_eq!(parse_console(""), None);
    }
}

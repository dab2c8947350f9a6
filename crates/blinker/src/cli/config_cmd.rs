//! `config` subcommand — show current configuration and file path.

use std::path::Path;

use super::{
    BlinkerError, Config, ConfigOutput, Result, config_file, kv, kv_indent, kv_width, led,
    redacted,
};

/// `"#0000FF00 -> #0000FF00"` style display of a configured color, or a marker when invalid.
fn color_display(value: &str) -> String {
    match led::parse_color(value) {
        Ok(color) => format!("{value} -> {}", led::format_color(color)),
        Err(_) => format!("{value} (invalid)"),
    }
}

fn pair_display(values: &[String; 2]) -> String {
    format!("{}, {}", color_display(&values[0]), color_display(&values[1]))
}

fn secs(value: f64) -> String {
    format!("{value} s")
}

/// Write the default config to `--config` or the platform path.
///
/// An existing file is never overwritten.
pub(super) fn init_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let Some(path) = config_file(custom_path) else {
        return Err(BlinkerError::Config("no config directory".into()));
    };
    if path.exists() {
        if !json {
            println!("{} already exists, left unchanged", path.display());
        }
        return Ok(());
    }
    match custom_path {
        Some(p) => Config::default().save_to(p)?,
        None => Config::default().save()?,
    }
    log::info!("wrote default config to {}", path.display());
    if !json {
        println!("Wrote defaults to {}", path.display());
        println!();
    }
    Ok(())
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = config_file(custom_path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let errors: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            valid: errors.is_empty(),
            errors,
            settings: redacted(&config),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:", "Validation:"],
        &[
            "wled_address:",
            "wled_username:",
            "input_pin:",
            "gpio_chip:",
            "active_low:",
            "debounce_samples:",
            "long_press_threshold:",
            "short_flash_duration:",
            "flash_interval:",
            "flash_brightness:",
            "short_colors:",
            "long_colors:",
            "transition_time:",
            "default_mode:",
            "default_effect_index:",
            "default_effect_speed:",
            "default_effect_intensity:",
            "max_retries:",
            "retry_delay:",
            "reconnect_delay:",
            "request_timeout:",
            "max_failed_attempts:",
            "log_file:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    if errors.is_empty() {
        kv("Validation:", "ok", w);
    } else {
        kv("Validation:", format_args!("{} problem(s)", errors.len()), w);
        for e in &errors {
            println!("  - {e}");
        }
    }
    println!();

    print_settings(&config, w);
    Ok(())
}

fn print_settings(config: &Config, w: usize) {
    println!("WLED:");
    kv_indent("wled_address:", &config.wled_address, w);
    kv_indent(
        "wled_username:",
        config.wled_username.as_deref().unwrap_or("(none)"),
        w,
    );
    kv_indent("request_timeout:", secs(config.request_timeout), w);
    kv_indent("max_retries:", config.max_retries, w);
    kv_indent("retry_delay:", secs(config.retry_delay), w);
    kv_indent("reconnect_delay:", secs(config.reconnect_delay), w);
    kv_indent("max_failed_attempts:", config.max_failed_attempts, w);
    println!();

    println!("Button:");
    kv_indent("input_pin:", config.input_pin, w);
    kv_indent("gpio_chip:", &config.gpio_chip, w);
    kv_indent("active_low:", config.active_low, w);
    kv_indent("debounce_samples:", config.debounce_samples, w);
    kv_indent("long_press_threshold:", secs(config.long_press_threshold), w);
    println!();

    println!("Sequences:");
    kv_indent("short_flash_duration:", secs(config.short_flash_duration), w);
    kv_indent("flash_interval:", secs(config.flash_interval), w);
    kv_indent("flash_brightness:", config.flash_brightness, w);
    kv_indent("short_colors:", pair_display(&config.short_colors), w);
    kv_indent("long_colors:", pair_display(&config.long_colors), w);
    println!();

    println!("Idle:");
    kv_indent("default_mode:", config.default_mode, w);
    kv_indent("default_effect_index:", config.default_effect_index, w);
    kv_indent("default_effect_speed:", config.default_effect_speed, w);
    kv_indent("default_effect_intensity:", config.default_effect_intensity, w);
    kv_indent("transition_time:", secs(config.transition_time), w);
    println!();

    let log_file = if config.log_file.is_empty() {
        "(stderr)"
    } else {
        config.log_file.as_str()
    };
    kv("log_file:", log_file, w);
}

//! `simulate` subcommand — play one press against the device without hardware.

use std::path::Path;
use std::time::Duration;

use super::{
    BlinkerError, Config, PressKind, Result, Service, Shutdown, SimulateOutput, config,
    http_factory, kv, kv_width,
};
use blinker_lib::connection::LinkError;

const STATE_POLL: Duration = Duration::from_millis(50);

/// How long to wait for the first successful probe before giving up.
fn connect_budget(config: &Config) -> Duration {
    let attempts = config.max_retries.max(1);
    config::seconds(config.request_timeout + config.reconnect_delay).saturating_mul(attempts)
}

/// Upper bound for the final idle command to go out once the sequence ended.
fn settle_budget(config: &Config) -> Duration {
    let attempts = config.max_retries.max(1);
    config::seconds(config.request_timeout + config.retry_delay).saturating_mul(attempts)
}

/// Block until the sequence is back to idle. Returns `false` on shutdown.
fn wait_for_idle(service: &Service, shutdown: &Shutdown) -> bool {
    while !service.state().is_idle() {
        if shutdown.wait(STATE_POLL) {
            return false;
        }
    }
    true
}

pub(super) fn cmd_simulate(
    kind: PressKind,
    json: bool,
    config_path: Option<&Path>,
    shutdown: &Shutdown,
) -> Result<()> {
    let config = super::load_config(config_path);
    let connect = connect_budget(&config);
    let settle = settle_budget(&config);
    let address = config.wled_address.clone();

    let service = Service::start(config, http_factory(), shutdown.clone())?;
    if !service.wait_until_available(connect) {
        if shutdown.is_triggered() {
            return Ok(());
        }
        log::error!("WLED at {address} did not answer within {connect:?}");
        return Err(BlinkerError::Link(LinkError::Unavailable));
    }
    // Let the startup restoration finish so it doesn't interleave with the press
    service.sequence().wait_settled(settle);

    if !json {
        println!("[press] {kind}");
    }
    service.inject(kind);
    if !wait_for_idle(&service, shutdown) {
        return Ok(());
    }
    let settled = service.sequence().wait_settled(settle);
    if !settled {
        log::warn!("idle command still pending when giving up");
    }

    let output = SimulateOutput {
        press: kind.to_string(),
        restorations: service.link().restorations(),
        health: service.health(),
    };
    service.stop();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    let w = kv_width(&["Status:", "Presses:", "Restorations:"], &[]);
    println!("[idle]  sequence finished");
    kv("Status:", output.health.status, w);
    kv("Presses:", output.health.button_press_count, w);
    kv("Restorations:", output.restorations, w);
    Ok(())
}

//! `status` subcommand — probe the WLED device once.

use std::path::Path;

use super::{
    DeviceStatusJson, LightingEndpoint, Result, StatusOutput, WledHttp, WledStatusJson, kv,
    kv_indent, kv_width,
};

/// Probe `endpoint` with a single info request. Never retries.
fn probe(url: String, endpoint: &impl LightingEndpoint) -> WledStatusJson {
    match endpoint.fetch_info() {
        Ok(info) => WledStatusJson {
            url,
            reachable: true,
            device: Some(DeviceStatusJson::from(&info)),
            error: None,
        },
        Err(e) => {
            log::debug!("status probe failed: {e}");
            WledStatusJson {
                url,
                reachable: false,
                device: None,
                error: Some(e.to_string()),
            }
        }
    }
}

fn print_status(output: &StatusOutput, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    let w = kv_width(&["Version:", "WLED:"], &["Reachable:", "Name:", "Firmware:", "LEDs:", "Error:"]);
    kv("Version:", &output.version, w);
    kv("WLED:", &output.wled.url, w);
    kv_indent("Reachable:", if output.wled.reachable { "yes" } else { "no" }, w);
    if let Some(dev) = &output.wled.device {
        kv_indent("Name:", &dev.name, w);
        kv_indent("Firmware:", &dev.firmware, w);
        kv_indent("LEDs:", dev.led_count, w);
    }
    if let Some(e) = &output.wled.error {
        kv_indent("Error:", e, w);
    }
    Ok(())
}

pub(super) fn cmd_status(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    let http = WledHttp::from_config(&config)?;
    let output = StatusOutput {
        version: env!("CARGO_PKG_VERSION").to_string(),
        wled: probe(http.base_url().to_string(), &http),
    };
    print_status(&output, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinker_lib::endpoint::mock::MockEndpoint;

    #[test]
    fn probe_reports_device() {
        let endpoint = MockEndpoint::new();
        let status = probe("http://wled".into(), &endpoint);
        assert!(status.reachable);
        assert_eq!(status.device.map(|d| d.led_count), Some(30));
        assert!(status.error.is_none());
        assert_eq!(endpoint.info_calls(), 1);
    }

    #[test]
    fn probe_failure_is_not_retried() {
        let endpoint = MockEndpoint::new();
        endpoint.fail_infos(5);
        let status = probe("http://wled".into(), &endpoint);
        assert!(!status.reachable);
        assert!(status.device.is_none());
        assert!(status.error.is_some());
        assert_eq!(endpoint.info_calls(), 1);
    }
}

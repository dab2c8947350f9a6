//! `effects` subcommand — list the device's effects with their indices.

use std::path::Path;

use super::{EffectJson, EffectsOutput, LightingEndpoint, Result, WledHttp};

fn collect(endpoint: &impl LightingEndpoint, default_index: i64) -> Result<EffectsOutput> {
    let names = endpoint.fetch_effects()?;
    Ok(EffectsOutput {
        count: names.len(),
        default_index,
        effects: names
            .into_iter()
            .enumerate()
            .map(|(index, name)| EffectJson { index, name })
            .collect(),
    })
}

/// One line per effect; the configured default is starred.
fn render(output: &EffectsOutput) -> Vec<String> {
    let digits = output.count.max(1).to_string().len();
    output
        .effects
        .iter()
        .map(|e| {
            let marker = if e.index as i64 == output.default_index {
                '*'
            } else {
                ' '
            };
            format!("{marker} {:>digits$}  {}", e.index, e.name)
        })
        .collect()
}

pub(super) fn cmd_effects(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path);
    let http = WledHttp::from_config(&config)?;
    let output = collect(&http, config.default_effect_index)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::other)?
        );
        return Ok(());
    }

    println!("{} effects on {}", output.count, http.base_url());
    for line in render(&output) {
        println!("{line}");
    }
    Ok(())
}

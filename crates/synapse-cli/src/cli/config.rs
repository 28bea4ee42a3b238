//! `synapse config` subcommands.

use std::path::Path;

use anyhow::Result;
use console::style;
use synapse_types::config::BusConfig;

/// Print the effective configuration as TOML (or JSON with `--json`).
pub fn show_config(data_dir: &Path, config: &BusConfig, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "data_dir": data_dir.display().to_string(),
            "config": config,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "  {} {}",
        style("# effective config from").dim(),
        style(synapse_infra::paths::config_path(data_dir).display()).dim()
    );
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default configuration into `data_dir`.
pub async fn init_config(data_dir: &Path, force: bool, json: bool) -> Result<()> {
    let path = synapse_infra::config::write_bus_config(data_dir, &BusConfig::default(), force).await?;

    if json {
        let value = serde_json::json!({ "written": path.display().to_string() });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "  {} Wrote {}",
            style("✓").green().bold(),
            style(path.display()).cyan()
        );
    }
    Ok(())
}

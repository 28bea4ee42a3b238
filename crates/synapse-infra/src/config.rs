//! Bus configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.synapse/` by default)
//! and deserializes it into [`BusConfig`]. Missing, unreadable, malformed or
//! invalid files fall back to the defaults with a logged warning, so a bad
//! config never keeps the bus from starting.

use std::path::{Path, PathBuf};

use anyhow::Context;
use synapse_types::config::BusConfig;

use crate::paths::config_path;

/// Load bus configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`BusConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
/// - If the parsed config fails validation, logs a warning and returns the default.
pub async fn load_bus_config(data_dir: &Path) -> BusConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return BusConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return BusConfig::default();
        }
    };

    let config = match toml::from_str::<BusConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            return BusConfig::default();
        }
    };

    match config.validate() {
        Ok(()) => config,
        Err(err) => {
            tracing::warn!("Invalid bus config in {}: {err}, using defaults", path.display());
            BusConfig::default()
        }
    }
}

/// Write `config` to `{data_dir}/config.toml`, creating the directory if needed.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub async fn write_bus_config(
    data_dir: &Path,
    config: &BusConfig,
    force: bool,
) -> anyhow::Result<PathBuf> {
    let path = config_path(data_dir);
    if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let content = toml::to_string_pretty(config).context("failed to serialize bus config")?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!("Wrote bus config to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_bus_config(tmp.path()).await;
        assert_eq!(config, BusConfig::default());
    }

    #[tokio::test]
    async fn partial_toml_overrides_only_given_fields() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
worker_count = 8
max_attempts = 5
backoff_unit_ms = 250
"#,
        )
        .await
        .unwrap();

        let config = load_bus_config(tmp.path()).await;
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_unit_ms, 250);
        assert_eq!(config.queue_capacity, BusConfig::default().queue_capacity);
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_bus_config(tmp.path()).await;
        assert_eq!(config, BusConfig::default());
    }

    #[tokio::test]
    async fn zero_capacity_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "queue_capacity = 0\n")
            .await
            .unwrap();

        let config = load_bus_config(tmp.path()).await;
        assert_eq!(config.queue_capacity, BusConfig::default().queue_capacity);
    }

    #[tokio::test]
    async fn written_config_loads_back() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().join("nested");
        let config = BusConfig {
            worker_count: 2,
            reply_rate_limit: 3,
            ..BusConfig::default()
        };

        let path = write_bus_config(&data_dir, &config, false).await.unwrap();
        assert_eq!(path, data_dir.join("config.toml"));
        assert_eq!(load_bus_config(&data_dir).await, config);
    }

    #[tokio::test]
    async fn write_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        write_bus_config(tmp.path(), &BusConfig::default(), false)
            .await
            .unwrap();

        let err = write_bus_config(tmp.path(), &BusConfig::default(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(write_bus_config(tmp.path(), &BusConfig::default(), true).await.is_ok());
    }
}

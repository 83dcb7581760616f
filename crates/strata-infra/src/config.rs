//! Configuration loading from `config.toml` and data directory resolution.
//!
//! Reads the orchestrator configuration from `{data_dir}/config.toml`.
//! Falls back to defaults when the file is missing or invalid.

use std::path::{Path, PathBuf};

use strata_types::config::OrchestratorConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "STRATA_DATA_DIR";

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `STRATA_DATA_DIR` environment variable
/// 2. `~/.strata`
/// 3. `.strata` in the current directory
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".strata");
    }

    PathBuf::from(".strata")
}

/// Load the orchestrator config from `{data_dir}/config.toml`.
///
/// Returns `OrchestratorConfig::default()` if the file doesn't exist or
/// can't be parsed. Logs a warning on parse errors but never fails.
/// `max_concurrent_steps`, `default_step_timeout_secs` and
/// `event_bus_capacity` are floored at 1.
pub async fn load_config(data_dir: &Path) -> OrchestratorConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
    };

    let mut config = match toml::from_str::<OrchestratorConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return OrchestratorConfig::default();
        }
    };

    if config.max_concurrent_steps == 0 {
        tracing::warn!("max_concurrent_steps = 0 in config.toml, using 1");
        config.max_concurrent_steps = 1;
    }
    if config.default_step_timeout_secs == 0 {
        tracing::warn!("default_step_timeout_secs = 0 in config.toml, using 1");
        config.default_step_timeout_secs = 1;
    }
    config.event_bus_capacity = config.event_bus_capacity.max(1);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
max_concurrent_steps = 4
default_step_timeout_secs = 45
event_bus_capacity = 64
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_concurrent_steps, 4);
        assert_eq!(config.default_step_timeout_secs, 45);
        assert_eq!(config.event_bus_capacity, 64);
    }

    #[tokio::test]
    async fn load_config_partial_toml_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "default_step_timeout_secs = 10\n")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.default_step_timeout_secs, 10);
        assert_eq!(config.max_concurrent_steps, 16);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "max_concurrent_steps = \"many\"")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[tokio::test]
    async fn load_config_floors_zero_values() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            "max_concurrent_steps = 0\ndefault_step_timeout_secs = 0\nevent_bus_capacity = 0\n",
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_concurrent_steps, 1);
        assert_eq!(config.default_step_timeout_secs, 1);
        assert_eq!(config.event_bus_capacity, 1);
    }

    #[test]
    fn default_data_dir_is_not_empty() {
        let dir = default_data_dir();
        assert!(!dir.as_os_str().is_empty());
    }
}

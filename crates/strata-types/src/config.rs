//! Orchestrator configuration types.
//!
//! `OrchestratorConfig` represents the top-level `config.toml` that controls
//! step fan-out, default step timeouts, and event bus sizing.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestrator.
///
/// Loaded from `~/.strata/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on executor calls in flight at once, across all executions.
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,

    /// Step timeout applied when a step does not set `timeout_secs`.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,

    /// Capacity of the broadcast channel carrying execution events.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_max_concurrent_steps() -> usize {
    16
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_event_bus_capacity() -> usize {
    1024
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: default_max_concurrent_steps(),
            default_step_timeout_secs: default_step_timeout_secs(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_concurrent_steps, 16);
        assert_eq!(config.default_step_timeout_secs, 300);
        assert_eq!(config.event_bus_capacity, 1024);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
max_concurrent_steps = 4
default_step_timeout_secs = 30
"#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_concurrent_steps, 4);
        assert_eq!(config.default_step_timeout_secs, 30);
        assert_eq!(config.event_bus_capacity, 1024);
    }
}

//! Configuration loading and management

mod agent;
mod io;

pub use agent::AgentSettings;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

fn default_data_dir() -> PathBuf {
    Config::global_config_dir().join("data")
}

fn default_agent() -> String {
    "claude".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_usage_limit_fallback_minutes() -> i64 {
    60
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the JSON record store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Agent used for tasks that do not name one
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// Ceiling for health/auth/usage probes
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// How long an agent stays gated after a usage limit without a reset time
    #[serde(default = "default_usage_limit_fallback_minutes")]
    pub usage_limit_fallback_minutes: i64,

    #[serde(default)]
    pub agents: HashMap<String, AgentSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_agent: default_agent(),
            probe_timeout_secs: default_probe_timeout_secs(),
            usage_limit_fallback_minutes: default_usage_limit_fallback_minutes(),
            agents: HashMap::new(),
        }
    }
}

impl Config {
    /// Settings for `agent_id`, defaults when the table is absent
    pub fn agent(&self, agent_id: &str) -> AgentSettings {
        self.agents.get(agent_id).cloned().unwrap_or_default()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn usage_limit_fallback(&self) -> TimeDelta {
        TimeDelta::minutes(self.usage_limit_fallback_minutes.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_agent, "claude");
        assert_eq!(config.probe_timeout(), Duration::from_secs(30));
        assert_eq!(config.usage_limit_fallback(), TimeDelta::minutes(60));
    }

    #[test]
    fn test_agent_tables() {
        let config: Config = toml::from_str(
            r#"
            default_agent = "codex"
            probe_timeout_secs = 5

            [agents.claude]
            binary = "/opt/claude/bin/claude"
            model = "opus"
            extra_dirs = ["/srv/docs"]

            [agents.claude.env]
            ANTHROPIC_LOG = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_agent, "codex");
        let claude = config.agent("claude");
        assert_eq!(claude.binary, Some(PathBuf::from("/opt/claude/bin/claude")));
        assert_eq!(claude.model.as_deref(), Some("opus"));
        assert_eq!(claude.extra_dirs, vec![PathBuf::from("/srv/docs")]);
        assert_eq!(claude.env.get("ANTHROPIC_LOG").map(String::as_str), Some("debug"));
        assert_eq!(config.agent("codex"), AgentSettings::default());
    }
}

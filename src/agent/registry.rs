//! Agent registry for managing multiple agent adapters.
//!
//! The registry is built once from [`Config`] and handed to whoever needs an
//! adapter; there is no process-wide instance.
//!
//! ```rust,ignore
//! let registry = AgentRegistry::from_config(&config);
//! let claude = registry.get("claude").expect("built-in");
//! claude.resolve_executable().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::{AgentAdapter, CliCore};
use super::claude::ClaudeAdapter;
use super::codex::CodexAdapter;
use super::models::{CLAUDE_DEFAULT_MODEL, CLAUDE_MODELS, CODEX_DEFAULT_MODEL, CODEX_MODELS};
use super::resolver::CliResolver;
use super::stream::{CLAUDE, CODEX, WireDialect};
use crate::config::{AgentSettings, Config};

/// Agent ids with a built-in adapter
pub const BUILTIN_AGENTS: &[&str] = &["claude", "codex"];

pub struct AgentRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

fn core_for(
    resolver: CliResolver,
    dialect: &'static WireDialect,
    builtin_models: &[&str],
    builtin_default: &str,
    settings: &AgentSettings,
    config: &Config,
) -> CliCore {
    let models: Vec<String> = if settings.models.is_empty() {
        builtin_models.iter().map(|m| m.to_string()).collect()
    } else {
        settings.models.clone()
    };
    let default_model = settings
        .default_model
        .clone()
        .unwrap_or_else(|| builtin_default.to_string());

    let core = CliCore::new(resolver, dialect)
        .with_models(models, Some(default_model))
        .with_probe_timeout(config.probe_timeout());
    if settings.binary.is_some() {
        core.set_custom_path(settings.binary.clone());
    }
    core
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Built-in adapters with default settings
    pub fn with_defaults() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        let claude = config.agent("claude");
        registry.register(Arc::new(ClaudeAdapter::with_core(core_for(
            CliResolver::claude(),
            &CLAUDE,
            CLAUDE_MODELS,
            CLAUDE_DEFAULT_MODEL,
            &claude,
            config,
        ))));

        let codex = config.agent("codex");
        registry.register(Arc::new(CodexAdapter::with_core(core_for(
            CliResolver::codex(),
            &CODEX,
            CODEX_MODELS,
            CODEX_DEFAULT_MODEL,
            &codex,
            config,
        ))));

        for id in config.agents.keys() {
            if !BUILTIN_AGENTS.contains(&id.as_str()) {
                tracing::warn!(agent = %id, "no adapter for configured agent, ignoring");
            }
        }
        registry
    }

    /// Add or replace an adapter under its own id
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(id).cloned()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builtin_adapters() {
        let registry = AgentRegistry::with_defaults();
        assert_eq!(registry.ids(), vec!["claude", "codex"]);
        assert_eq!(registry.get("codex").map(|a| a.id().to_string()).as_deref(), Some("codex"));
        assert!(registry.get("gemini").is_none());
    }

    #[test]
    fn test_config_overrides_models() {
        let mut config = Config::default();
        config.agents.insert(
            "claude".to_string(),
            AgentSettings {
                models: vec!["claude-opus-5-0".to_string(), "claude-opus-4-1".to_string()],
                default_model: Some("claude-opus-4-1".to_string()),
                binary: Some(PathBuf::from("/nonexistent/claude")),
                ..Default::default()
            },
        );
        let registry = AgentRegistry::from_config(&config);
        let claude = registry.get("claude").unwrap();
        let models = claude.models();
        assert_eq!(models.resolve("opus"), "claude-opus-5-0");
        assert_eq!(models.resolve("haiku"), "claude-opus-4-1");
    }
}

//! CLI command implementations

pub mod agent;
pub mod project;
pub mod task;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use taskrail::agent::AgentRegistry;
use taskrail::config::Config;
use taskrail::task::{JsonTaskStore, Scheduler, TaskExecutor, TaskStateMachine, UsageLimitGate};

/// Everything a command needs, built once from the config
pub struct App {
    pub config: Config,
    pub machine: TaskStateMachine,
    pub registry: Arc<AgentRegistry>,
    pub gate: Arc<UsageLimitGate>,
}

impl App {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_path).context("Failed to load configuration")?;
        let store = Arc::new(JsonTaskStore::new(config.data_dir.clone()));
        Ok(Self {
            machine: TaskStateMachine::new(store),
            registry: Arc::new(AgentRegistry::from_config(&config)),
            gate: Arc::new(UsageLimitGate::new(config.usage_limit_fallback())),
            config,
        })
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor::new(
            self.machine.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.gate),
            self.config.clone(),
        )
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.machine.clone(),
            Arc::clone(&self.gate),
            self.config.default_agent.clone(),
        )
    }
}

/// Cancellation flag that flips on Ctrl-C
pub fn ctrl_c_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            let _ = tx.send(true);
        }
    });
    rx
}

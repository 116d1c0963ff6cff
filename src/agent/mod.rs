//! Agent execution and management.
//!
//! This module provides the abstraction layer for running CLI coding agents.
//! Every vendor implements [`AgentAdapter`]; the vendor-neutral pieces are
//! shared helpers the adapters compose:
//!
//! - [`resolver`] - finds the agent executable (PATH, login shell, known
//!   install locations) and turns version-manager scripts into interpreter
//!   invocations.
//! - [`process`] - spawns the agent and owns its process handle.
//! - [`stream`] - lazily parses JSON-lines output into [`crate::OutputEvent`]s.
//! - [`classifier`] - rate-limit / usage-limit / auth heuristics.
//! - [`models`] - model tiers, versions and alias resolution.
//! - [`probe`] - short diagnostic runs with a timeout.
//!
//! Adapters:
//! - [`ClaudeAdapter`] - Claude Code CLI (`stream-json`)
//! - [`CodexAdapter`] - OpenAI Codex CLI (`exec --json`)
//!
//! ```rust,ignore
//! use taskrail::agent::{AgentRegistry, InvokeOptions};
//!
//! let registry = AgentRegistry::from_config(&config);
//! let claude = registry.get("claude").unwrap();
//! claude.resolve_executable().await;
//! let mut process = claude.invoke("Fix the failing test", &InvokeOptions::default())?;
//! let events = claude.parse_output(Box::new(process.take_stdout().unwrap()));
//! ```

mod adapter;
pub mod chat;
pub mod classifier;
mod claude;
mod codex;
mod error;
pub mod models;
pub mod probe;
pub mod process;
mod registry;
pub mod resolver;
pub mod stream;
pub mod transcript;

pub use adapter::{AgentAdapter, CliCore, DEFAULT_PROBE_TIMEOUT, Invocation, InvokeOptions};
pub use chat::{ChatEvent, ChatSession};
pub use claude::{ClaudeAdapter, format_tool_call};
pub use codex::CodexAdapter;
pub use error::AdapterError;
pub use models::ModelRegistry;
pub use probe::{AuthStatus, HealthStatus};
pub use process::AgentProcess;
pub use registry::{AgentRegistry, BUILTIN_AGENTS};
pub use resolver::{CliResolver, ExecutionPlan};
pub use stream::EventStream;

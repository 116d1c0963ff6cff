//! taskrail - queued coding tasks on top of agent CLIs
//!
//! taskrail keeps a queue of prompts per project and runs them through an
//! external coding agent (Claude Code or Codex), one iteration at a time.
//!
//! ## Pieces
//!
//! - [`agent`]: locating agent executables, launching them and turning their
//!   JSON-lines output into typed events, plus usage/rate/auth classification.
//! - [`task`]: the task lifecycle state machine, its store, the scheduler and
//!   the executor that ties a task to an agent run.
//! - [`config`]: `~/.taskrail/config.toml`.

pub mod agent;
mod atomic_file;
pub mod config;
pub mod domain;
pub mod task;

pub use domain::*;

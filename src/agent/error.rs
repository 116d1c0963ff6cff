//! Errors surfaced by agent adapters

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// `invoke`/`chat` called before `resolve_executable` found the CLI
    #[error("{agent} executable has not been resolved; call resolve_executable() first")]
    NotResolved { agent: String },

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture {0} pipe")]
    MissingPipe(&'static str),

    #[error("could not open a terminal for re-authentication: {0}")]
    Reauth(String),
}

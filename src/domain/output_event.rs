use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token counts reported by an agent's final record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

/// Details carried by the final record of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub result: Option<String>,
    pub is_error: bool,
    pub usage: Option<TokenUsage>,
    pub cost_usd: Option<f64>,
}

/// The kind of an event decoded from agent output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputEventKind {
    /// Anything that is not an error or the final record
    Log,
    /// Generic error
    Error { message: String },
    /// Transient throttling, retry soon
    RateLimit,
    /// Quota exhausted, retry after `reset_at` when known
    UsageLimit { reset_at: Option<DateTime<Utc>> },
    /// Final record of the run
    Complete(Completion),
}

/// One classified line of agent output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub kind: OutputEventKind,
    /// The line exactly as decoded (trimmed), kept for display
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    /// Vendor conversation id, when the record carried one
    #[serde(default)]
    pub session_id: Option<String>,
}

impl OutputEvent {
    pub fn new(kind: OutputEventKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.kind, OutputEventKind::Complete(_))
    }

    /// Short label used in logs and the CLI
    pub fn label(&self) -> &'static str {
        match self.kind {
            OutputEventKind::Log => "log",
            OutputEventKind::Error { .. } => "error",
            OutputEventKind::RateLimit => "rate-limit",
            OutputEventKind::UsageLimit { .. } => "usage-limit",
            OutputEventKind::Complete(_) => "complete",
        }
    }
}

/// Result of usage-limit detection over a piece of text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimitResult {
    pub is_usage_limit: bool,
    pub reset_at: Option<DateTime<Utc>>,
}

impl UsageLimitResult {
    pub fn none() -> Self {
        Self::default()
    }
}

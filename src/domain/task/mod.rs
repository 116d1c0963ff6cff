mod error;
mod impls;
mod status;

pub use error::TransitionError;
pub use status::TaskStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a task (unique within its project)
pub type TaskId = String;

/// Identifier of a project
pub type ProjectId = String;

/// A unit of work handed to a coding agent, possibly over several iterations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub project_id: ProjectId,

    /// Prompt for the next iteration (edited by the user between iterations)
    pub prompt: String,

    status: TaskStatus,

    /// Lower runs earlier
    pub queue_position: i64,

    current_iteration: u32,

    /// Append-only history of finished iterations
    #[serde(default)]
    iterations: Vec<Iteration>,

    /// Accumulated active time across all closed sessions
    #[serde(default)]
    runtime_ms: u64,

    /// Start of the currently open running/awaiting session
    #[serde(default)]
    running_session_started_at: Option<DateTime<Utc>>,

    /// Agent override (registry default when absent)
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Model override or alias (agent default when absent)
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub needs_continuation: bool,

    #[serde(default)]
    pub continuation_reason: Option<String>,

    #[serde(default)]
    pub suggested_next_steps: Vec<String>,

    /// Vendor conversation id of the last run, usable for `--resume`
    #[serde(default)]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub cost_usd: Option<f64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// First time the task entered an active session
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the task reaches a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    iteration_started_at: Option<DateTime<Utc>>,

    /// `runtime_ms` at the moment the current iteration began
    #[serde(default)]
    iteration_runtime_base_ms: u64,
}

/// Final status recorded for an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    NeedsReview,
    Failed,
    Cancelled,
}

impl From<IterationStatus> for TaskStatus {
    fn from(status: IterationStatus) -> Self {
        match status {
            IterationStatus::NeedsReview => TaskStatus::NeedsReview,
            IterationStatus::Failed => TaskStatus::Failed,
            IterationStatus::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// One finished run attempt. Never modified after it is appended to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub iteration: u32,
    /// The prompt actually sent to the agent
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub runtime_ms: u64,
    pub final_status: IterationStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// What the caller observed when an iteration ended
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub final_status: IterationStatus,
    pub prompt: String,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
    pub continuation: Option<ContinuationHint>,
}

impl IterationOutcome {
    pub fn new(final_status: IterationStatus, prompt: impl Into<String>) -> Self {
        Self {
            final_status,
            prompt: prompt.into(),
            exit_code: None,
            error_message: None,
            continuation: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_continuation(mut self, hint: Option<ContinuationHint>) -> Self {
        self.continuation = hint;
        self
    }
}

/// Signal that a finished run left work undone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationHint {
    pub reason: String,
    pub next_steps: Vec<String>,
}

/// Partial update accepted by the record store
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub prompt: Option<String>,
    pub queue_position: Option<i64>,
    pub agent_id: Option<Option<String>>,
    pub model: Option<Option<String>>,
}

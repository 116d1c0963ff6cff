use super::{TaskId, TaskStatus};

/// Why a task state change was refused or could not be applied
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("task {task_id} not found")]
    NotFound { task_id: TaskId },

    /// The task was left unchanged
    #[error("task {task_id} cannot move from {from} to {to}")]
    Invalid {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("record store failure: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<anyhow::Error> for TransitionError {
    fn from(err: anyhow::Error) -> Self {
        TransitionError::Store(err.into())
    }
}

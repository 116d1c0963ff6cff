use serde::{Deserialize, Serialize};

/// The lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task exists but has not been queued yet
    Backlog,
    /// Task is in the queue waiting to be picked
    Queued,
    /// Task was picked by the scheduler but the agent process has not started yet
    AwaitingAgent,
    /// Agent process is running
    Running,
    /// Task was paused by the user
    Paused,
    /// Task was cancelled
    Cancelled,
    /// Iteration finished, waiting for the user to review
    NeedsReview,
    /// Result was declined by the user
    Rejected,
    /// Result was accepted by the user
    Completed,
    /// Iteration failed
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 10] = [
        TaskStatus::Backlog,
        TaskStatus::Queued,
        TaskStatus::AwaitingAgent,
        TaskStatus::Running,
        TaskStatus::Paused,
        TaskStatus::Cancelled,
        TaskStatus::NeedsReview,
        TaskStatus::Rejected,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Queued => "queued",
            TaskStatus::AwaitingAgent => "awaiting_agent",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::NeedsReview => "needs_review",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Statuses that hold an open runtime session
    pub fn is_active_session(&self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::AwaitingAgent)
    }

    /// Statuses that stamp `completed_at` when entered
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Rejected | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Re-prompting (`needs_review`/`failed` → `queued`) is listed here, but it only
    /// happens through `start_new_iteration`, which also bumps the iteration counter.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus as S;
        match (self, next) {
            (S::Backlog, S::Queued) => true,
            (S::Queued, S::Backlog | S::AwaitingAgent | S::Running) => true,
            (S::AwaitingAgent, S::Running | S::Queued) => true,
            (S::Paused, S::Queued | S::Running) => true,
            (S::Running | S::AwaitingAgent, S::Paused) => true,
            (S::Running, S::NeedsReview) => true,
            (S::NeedsReview, S::Completed | S::Rejected | S::Queued) => true,
            (S::Failed, S::Queued) => true,
            (from, S::Cancelled | S::Failed) => {
                !from.is_terminal() || (*from == S::Failed && next == S::Cancelled)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_exits() {
        assert!(TaskStatus::NeedsReview.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::NeedsReview.can_transition_to(TaskStatus::Rejected));
        assert!(TaskStatus::NeedsReview.can_transition_to(TaskStatus::Queued));
        assert!(!TaskStatus::NeedsReview.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn test_terminal_statuses_do_not_reopen() {
        for status in [TaskStatus::Completed, TaskStatus::Rejected, TaskStatus::Cancelled] {
            for next in TaskStatus::ALL {
                assert!(
                    !status.can_transition_to(next),
                    "{} must not transition to {}",
                    status,
                    next
                );
            }
        }
    }

    #[test]
    fn test_running_can_fail_or_cancel() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::AwaitingAgent.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert_eq!(
            serde_json::to_string(&TaskStatus::AwaitingAgent).unwrap(),
            "\"awaiting_agent\""
        );
    }
}

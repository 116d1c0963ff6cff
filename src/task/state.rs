//! Task lifecycle entry points.
//!
//! Each entry point loads the task, applies one transition through the
//! domain methods (which validate against the single transition table),
//! saves it and broadcasts a [`StatusChange`]. Callers never mutate status
//! directly.
//!
//! Load, mutate and save run under a per-task lock, and the save only lands if
//! the stored status is still the one the transition started from. Two
//! transitions on the same task therefore never interleave, even across state
//! machines sharing one store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{OwnedMutexGuard, broadcast};

use super::clock::{Clock, SystemClock};
use super::store::TaskStore;
use crate::{Iteration, IterationOutcome, Task, TaskStatus, TransitionError};

const EVENT_CAPACITY: usize = 256;

/// Emitted after every persisted status change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub project_id: String,
    pub task_id: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub iteration: u32,
    pub at: DateTime<Utc>,
}

type TaskLocks = Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>;

#[derive(Clone)]
pub struct TaskStateMachine {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<StatusChange>,
    locks: Arc<TaskLocks>,
}

impl TaskStateMachine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            clock,
            events,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Status-change notifications; lagging receivers miss old events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    pub async fn load(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.store
            .load_task(project_id, task_id)
            .await?
            .ok_or_else(|| TransitionError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Create a backlog task
    pub async fn create_task(
        &self,
        project_id: &str,
        prompt: impl Into<String> + Send,
    ) -> Result<Task, TransitionError> {
        let task = Task::new(uuid::Uuid::new_v4().to_string(), project_id, prompt, self.now());
        self.store.save_task(&task).await?;
        tracing::info!(task_id = %task.id, project_id, "task created");
        Ok(task)
    }

    async fn lock_task(&self, project_id: &str, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody is waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((project_id.to_string(), task_id.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Load, mutate, save, notify. `f` leaves the task untouched when it errors.
    async fn apply<T, F>(&self, project_id: &str, task_id: &str, f: F) -> Result<(Task, T), TransitionError>
    where
        F: FnOnce(&mut Task, DateTime<Utc>) -> Result<T, TransitionError> + Send,
        T: Send,
    {
        let _guard = self.lock_task(project_id, task_id).await;
        let mut task = self.load(project_id, task_id).await?;
        let from = task.status();
        let now = self.now();
        let value = f(&mut task, now)?;

        if !self.store.save_task_if_status(&task, from).await? {
            // Another writer on the same store moved the task first.
            let current = self.load(project_id, task_id).await?;
            tracing::debug!(task_id, from = %from, current = %current.status(), "lost transition race");
            return Err(TransitionError::Invalid {
                task_id: task_id.to_string(),
                from: current.status(),
                to: task.status(),
            });
        }

        if task.status() != from {
            tracing::debug!(
                task_id,
                iteration = task.current_iteration(),
                from = %from,
                to = %task.status(),
                "task status changed"
            );
            // No receivers is fine.
            let _ = self.events.send(StatusChange {
                project_id: project_id.to_string(),
                task_id: task_id.to_string(),
                from,
                to: task.status(),
                iteration: task.current_iteration(),
                at: now,
            });
        }
        Ok((task, value))
    }

    /// queued / awaiting_agent / paused → running
    pub async fn start_task(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.apply(project_id, task_id, |task, now| {
            task.transition(TaskStatus::Running, now)
        })
        .await
        .map(|(task, ())| task)
    }

    /// Append the iteration record, then move to its final status
    pub async fn complete_iteration(
        &self,
        project_id: &str,
        task_id: &str,
        outcome: IterationOutcome,
    ) -> Result<(Task, Iteration), TransitionError> {
        self.apply(project_id, task_id, |task, now| task.complete_iteration(outcome, now))
            .await
    }

    /// needs_review / failed → queued with the next iteration number
    pub async fn start_new_iteration(
        &self,
        project_id: &str,
        task_id: &str,
        prompt: Option<String>,
    ) -> Result<Task, TransitionError> {
        let (task, ()) = self
            .apply(project_id, task_id, |task, now| task.start_new_iteration(prompt, now))
            .await?;
        Ok(task)
    }

    pub async fn accept_task(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.move_to(project_id, task_id, TaskStatus::Completed, |s| s == TaskStatus::NeedsReview)
            .await
    }

    pub async fn reject_task(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.move_to(project_id, task_id, TaskStatus::Rejected, |s| s == TaskStatus::NeedsReview)
            .await
    }

    /// backlog / paused → queued, at the end of the queue
    pub async fn enqueue(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        let next_position = self
            .store
            .list_tasks(project_id)
            .await?
            .iter()
            .filter(|t| t.id != task_id)
            .map(|t| t.queue_position)
            .max()
            .map_or(0, |max| max + 1);

        self.apply(project_id, task_id, |task, now| {
            if !matches!(task.status(), TaskStatus::Backlog | TaskStatus::Paused) {
                return Err(TransitionError::Invalid {
                    task_id: task.id.clone(),
                    from: task.status(),
                    to: TaskStatus::Queued,
                });
            }
            task.transition(TaskStatus::Queued, now)?;
            task.queue_position = next_position;
            Ok(())
        })
        .await
        .map(|(task, ())| task)
    }

    /// queued → awaiting_agent. Of concurrent claims on one task exactly one wins;
    /// the others get [`TransitionError::Invalid`].
    pub async fn claim(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.move_to(project_id, task_id, TaskStatus::AwaitingAgent, |s| s == TaskStatus::Queued)
            .await
    }

    pub async fn pause(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.move_to(project_id, task_id, TaskStatus::Paused, |s| s.is_active_session())
            .await
    }

    pub async fn cancel(&self, project_id: &str, task_id: &str) -> Result<Task, TransitionError> {
        self.move_to(project_id, task_id, TaskStatus::Cancelled, |_| true)
            .await
    }

    /// Any non-terminal → failed with `message`
    pub async fn fail(
        &self,
        project_id: &str,
        task_id: &str,
        message: impl Into<String> + Send,
    ) -> Result<Task, TransitionError> {
        let message = message.into();
        tracing::warn!(task_id, error = %message, "task failed");
        self.apply(project_id, task_id, |task, now| task.fail(message, now))
            .await
            .map(|(task, ())| task)
    }

    pub async fn reorder(
        &self,
        project_id: &str,
        task_id: &str,
        queue_position: i64,
    ) -> Result<Task, TransitionError> {
        self.apply(project_id, task_id, |task, now| {
            task.queue_position = queue_position;
            task.updated_at = now;
            Ok(())
        })
        .await
        .map(|(task, ())| task)
    }

    /// Record the conversation id and cost of the latest run without a status change
    pub async fn record_run_metadata(
        &self,
        project_id: &str,
        task_id: &str,
        conversation_id: Option<String>,
        cost_usd: Option<f64>,
    ) -> Result<Task, TransitionError> {
        self.apply(project_id, task_id, |task, now| {
            if conversation_id.is_some() {
                task.conversation_id = conversation_id;
            }
            if let Some(cost) = cost_usd {
                task.cost_usd = Some(task.cost_usd.unwrap_or(0.0) + cost);
            }
            task.updated_at = now;
            Ok(())
        })
        .await
        .map(|(task, ())| task)
    }

    /// Plain transition restricted to the source statuses `allowed` accepts
    async fn move_to(
        &self,
        project_id: &str,
        task_id: &str,
        to: TaskStatus,
        allowed: fn(TaskStatus) -> bool,
    ) -> Result<Task, TransitionError> {
        self.apply(project_id, task_id, |task, now| {
            if !allowed(task.status()) {
                return Err(TransitionError::Invalid {
                    task_id: task.id.clone(),
                    from: task.status(),
                    to,
                });
            }
            task.transition(to, now)
        })
        .await
        .map(|(task, ())| task)
    }
}

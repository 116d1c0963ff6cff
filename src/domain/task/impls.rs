use chrono::{DateTime, Utc};

use super::{
    ContinuationHint, Iteration, IterationOutcome, ProjectId, Task, TaskId, TaskPatch, TaskStatus,
    TransitionError,
};

impl Task {
    /// Create a new task in the backlog
    pub fn new(
        id: impl Into<TaskId>,
        project_id: impl Into<ProjectId>,
        prompt: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            prompt: prompt.into(),
            status: TaskStatus::Backlog,
            queue_position: 0,
            current_iteration: 1,
            iterations: Vec::new(),
            runtime_ms: 0,
            running_session_started_at: None,
            agent_id: None,
            model: None,
            exit_code: None,
            error_message: None,
            needs_continuation: false,
            continuation_reason: None,
            suggested_next_steps: Vec::new(),
            conversation_id: None,
            cost_usd: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            iteration_started_at: None,
            iteration_runtime_base_ms: 0,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }

    pub fn iterations(&self) -> &[Iteration] {
        &self.iterations
    }

    pub fn last_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Runtime of all closed sessions
    pub fn runtime_ms(&self) -> u64 {
        self.runtime_ms
    }

    pub fn running_session_started_at(&self) -> Option<DateTime<Utc>> {
        self.running_session_started_at
    }

    /// Runtime including the open session, if any
    pub fn live_runtime_ms(&self, now: DateTime<Utc>) -> u64 {
        self.runtime_ms
            + self
                .running_session_started_at
                .map(|start| elapsed_ms(start, now))
                .unwrap_or(0)
    }

    /// Move to `next` if the transition table allows it.
    pub fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(self.rejected(next));
        }
        self.apply_status(next, now);
        Ok(())
    }

    /// Close the running iteration: append its record, then apply the final status.
    pub fn complete_iteration(
        &mut self,
        outcome: IterationOutcome,
        now: DateTime<Utc>,
    ) -> Result<Iteration, TransitionError> {
        let next = TaskStatus::from(outcome.final_status);
        if !self.status.is_active_session() || !self.status.can_transition_to(next) {
            return Err(self.rejected(next));
        }

        self.close_session(now);
        let iteration = Iteration {
            iteration: self.current_iteration,
            prompt: outcome.prompt,
            started_at: self
                .iteration_started_at
                .or(self.started_at)
                .unwrap_or(now),
            completed_at: now,
            exit_code: outcome.exit_code,
            runtime_ms: self.runtime_ms.saturating_sub(self.iteration_runtime_base_ms),
            final_status: outcome.final_status,
            error_message: outcome.error_message.clone(),
        };
        self.iterations.push(iteration.clone());

        self.exit_code = outcome.exit_code;
        self.error_message = outcome.error_message;
        self.set_continuation(outcome.continuation);
        self.apply_status(next, now);

        Ok(iteration)
    }

    /// Re-prompt after review or failure. History is kept; per-run fields are cleared.
    pub fn start_new_iteration(
        &mut self,
        prompt: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !matches!(self.status, TaskStatus::NeedsReview | TaskStatus::Failed) {
            return Err(self.rejected(TaskStatus::Queued));
        }

        self.current_iteration += 1;
        if let Some(prompt) = prompt {
            self.prompt = prompt;
        }
        self.exit_code = None;
        self.error_message = None;
        self.set_continuation(None);
        self.completed_at = None;
        self.iteration_started_at = None;
        self.iteration_runtime_base_ms = self.runtime_ms;
        self.apply_status(TaskStatus::Queued, now);
        Ok(())
    }

    /// Mark as failed with a message, closing any open session
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(TaskStatus::Failed) {
            return Err(self.rejected(TaskStatus::Failed));
        }
        self.error_message = Some(message.into());
        self.apply_status(TaskStatus::Failed, now);
        Ok(())
    }

    /// Whether the task reached a status that stamps `completed_at`
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn set_continuation(&mut self, hint: Option<ContinuationHint>) {
        match hint {
            Some(hint) => {
                self.needs_continuation = true;
                self.continuation_reason = Some(hint.reason);
                self.suggested_next_steps = hint.next_steps;
            }
            None => {
                self.needs_continuation = false;
                self.continuation_reason = None;
                self.suggested_next_steps.clear();
            }
        }
    }

    fn apply_status(&mut self, next: TaskStatus, now: DateTime<Utc>) {
        self.status = next;
        self.updated_at = now;

        if next.is_active_session() {
            if self.running_session_started_at.is_none() {
                self.running_session_started_at = Some(now);
            }
            if self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if self.iteration_started_at.is_none() {
                self.iteration_started_at = Some(now);
            }
        } else {
            self.close_session(now);
        }

        if next.is_terminal() {
            self.completed_at = Some(now);
        }
    }

    /// Flush the open session into `runtime_ms`. `take()` clears the marker in the
    /// same step, so a session is never counted twice.
    fn close_session(&mut self, now: DateTime<Utc>) {
        if let Some(start) = self.running_session_started_at.take() {
            self.runtime_ms += elapsed_ms(start, now);
        }
    }

    fn rejected(&self, to: TaskStatus) -> TransitionError {
        TransitionError::Invalid {
            task_id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none()
            && self.queue_position.is_none()
            && self.agent_id.is_none()
            && self.model.is_none()
    }

    /// Overwrite the fields that are set. Status and history are never patched.
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(prompt) = self.prompt {
            task.prompt = prompt;
        }
        if let Some(position) = self.queue_position {
            task.queue_position = position;
        }
        if let Some(agent_id) = self.agent_id {
            task.agent_id = agent_id;
        }
        if let Some(model) = self.model {
            task.model = model;
        }
        task.updated_at = now;
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}

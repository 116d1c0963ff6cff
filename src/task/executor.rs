//! Runs one iteration of a task end to end.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::watch;

use super::continuation;
use super::gate::UsageLimitGate;
use super::retry;
use super::state::TaskStateMachine;
use crate::agent::stream::lines;
use crate::agent::{AgentAdapter, AgentRegistry, InvokeOptions, classifier};
use crate::config::Config;
use crate::{
    Completion, Iteration, IterationOutcome, IterationStatus, OutputEventKind, Task, TaskStatus,
    TransitionError,
};

/// What happened to the iteration
#[derive(Debug, Clone)]
pub struct RunReport {
    pub task: Task,
    pub iteration: Iteration,
    /// Transient failure (rate limit); the same prompt can be retried soon
    pub retryable: bool,
    /// Set when the agent hit a usage limit and is blocked until then
    pub gated_until: Option<DateTime<Utc>>,
}

/// Everything observed while streaming one run
#[derive(Debug, Default)]
struct RunObservation {
    completion: Option<Completion>,
    usage_limit: Option<Option<DateTime<Utc>>>,
    rate_limited: bool,
    auth_failed: bool,
    last_error: Option<String>,
    conversation_id: Option<String>,
    cancelled: bool,
    exit_code: Option<i32>,
}

impl RunObservation {
    fn observe_text(&mut self, text: &str) {
        if self.usage_limit.is_none() {
            let usage = classifier::detect_usage_limit(text);
            if usage.is_usage_limit {
                self.usage_limit = Some(usage.reset_at);
            }
        }
        self.rate_limited |= classifier::is_rate_limit(text);
        self.auth_failed |= classifier::is_auth_error(text);
    }
}

/// Outcome decided from an observation
#[derive(Debug)]
struct Verdict {
    status: IterationStatus,
    error: Option<String>,
    retryable: bool,
    gated_until: Option<DateTime<Utc>>,
}

pub struct TaskExecutor {
    machine: TaskStateMachine,
    registry: Arc<AgentRegistry>,
    gate: Arc<UsageLimitGate>,
    config: Config,
}

impl TaskExecutor {
    pub fn new(
        machine: TaskStateMachine,
        registry: Arc<AgentRegistry>,
        gate: Arc<UsageLimitGate>,
        config: Config,
    ) -> Self {
        Self {
            machine,
            registry,
            gate,
            config,
        }
    }

    pub fn machine(&self) -> &TaskStateMachine {
        &self.machine
    }

    /// Start the task, run the agent, and record the iteration.
    ///
    /// Spawn and store failures end up as a failed iteration; only a task that
    /// cannot be started (or cannot be saved at all) returns an error.
    pub async fn run(
        &self,
        project_id: &str,
        task_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport, TransitionError> {
        let task = self.machine.start_task(project_id, task_id).await?;
        let agent_id = task
            .agent_id
            .clone()
            .unwrap_or_else(|| self.config.default_agent.clone());
        tracing::info!(task_id, agent = %agent_id, iteration = task.current_iteration(), "running task");

        let Some(adapter) = self.registry.get(&agent_id) else {
            let message = format!("unknown agent '{}'", agent_id);
            return self.finish_failed(&task, task.prompt.clone(), message).await;
        };

        if adapter.resolve_executable().await.is_none() {
            let message = format!(
                "{} executable not found on PATH or in known install locations; set [agents.{}].binary",
                agent_id, agent_id
            );
            return self.finish_failed(&task, task.prompt.clone(), message).await;
        }

        let prompt = self.iteration_prompt(&task).await;
        let options = self.invoke_options(&task, &agent_id, adapter.as_ref()).await;

        let observation = match self.stream_run(&task, adapter.as_ref(), &prompt, &options, cancel).await {
            Ok(observation) => observation,
            Err(message) => return self.finish_failed(&task, prompt, message).await,
        };

        let verdict = self.judge(&agent_id, &observation);
        let continuation = match verdict.status {
            IterationStatus::NeedsReview => observation
                .completion
                .as_ref()
                .and_then(|c| c.result.as_deref())
                .and_then(continuation::detect),
            _ => None,
        };

        if observation.conversation_id.is_some()
            || observation.completion.as_ref().is_some_and(|c| c.cost_usd.is_some())
        {
            let cost = observation.completion.as_ref().and_then(|c| c.cost_usd);
            if let Err(e) = self
                .machine
                .record_run_metadata(project_id, task_id, observation.conversation_id.clone(), cost)
                .await
            {
                tracing::error!(task_id, error = %e, "failed to record run metadata");
            }
        }

        let mut outcome = IterationOutcome::new(verdict.status, prompt)
            .with_exit_code(observation.exit_code)
            .with_continuation(continuation);
        if let Some(error) = verdict.error {
            outcome = outcome.with_error(error);
        }

        let (task, iteration) = self.complete(project_id, task_id, outcome).await?;
        Ok(RunReport {
            task,
            iteration,
            retryable: verdict.retryable,
            gated_until: verdict.gated_until,
        })
    }

    /// Original prompt for a fresh task; synthesized context after a failed or cancelled iteration
    async fn iteration_prompt(&self, task: &Task) -> String {
        let previous = match task.last_iteration() {
            Some(prev) if task.current_iteration() > 1 => prev,
            _ => return task.prompt.clone(),
        };
        if !matches!(
            previous.final_status,
            IterationStatus::Failed | IterationStatus::Cancelled
        ) {
            return task.prompt.clone();
        }

        let log = match self
            .machine
            .store()
            .read_iteration_log(&task.project_id, &task.id, previous.iteration)
            .await
        {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(task_id = %task.id, error = %e, "could not read previous log, retrying with original prompt");
                None
            }
        };
        let context = retry::synthesize(task, log.as_deref());
        tracing::debug!(
            task_id = %task.id,
            actions = context.action_count,
            has_progress = context.has_progress,
            "synthesized retry prompt"
        );
        context.prompt
    }

    async fn invoke_options(&self, task: &Task, agent_id: &str, adapter: &dyn AgentAdapter) -> InvokeOptions {
        let settings = self.config.agent(agent_id);
        let model = task
            .model
            .clone()
            .or(settings.model)
            .map(|alias| adapter.models().resolve(&alias));

        let cwd = match self.machine.store().load_project(&task.project_id).await {
            Ok(project) => project.map(|p| p.path),
            Err(e) => {
                tracing::warn!(project_id = %task.project_id, error = %e, "could not load project");
                None
            }
        };

        InvokeOptions {
            model,
            conversation_id: None,
            cwd,
            extra_dirs: settings.extra_dirs,
            env: settings.env,
        }
    }

    /// Spawn, stream and wait. `Err` carries a spawn failure message.
    async fn stream_run(
        &self,
        task: &Task,
        adapter: &dyn AgentAdapter,
        prompt: &str,
        options: &InvokeOptions,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunObservation, String> {
        let mut process = adapter.invoke(prompt, options).map_err(|e| e.to_string())?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| "agent stdout was not captured".to_string())?;
        let stderr = process.take_stderr();

        let stderr_task = tokio::spawn(async move {
            match stderr {
                Some(stderr) => lines(stderr).collect::<Vec<String>>().await,
                None => Vec::new(),
            }
        });

        let mut observation = RunObservation::default();
        let mut events = adapter.parse_output(Box::new(stdout));
        let mut cancel_open = true;
        if *cancel.borrow_and_update() {
            observation.cancelled = process.kill();
        }

        loop {
            tokio::select! {
                biased;
                changed = cancel.changed(), if cancel_open && !observation.cancelled => {
                    match changed {
                        Ok(()) if *cancel.borrow_and_update() => {
                            tracing::info!(task_id = %task.id, pid = ?process.pid(), "cancelling agent run");
                            process.kill();
                            observation.cancelled = true;
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }
                event = events.next() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self
                        .machine
                        .store()
                        .append_iteration_log(&task.project_id, &task.id, task.current_iteration(), &event.raw)
                        .await
                    {
                        tracing::error!(task_id = %task.id, error = %e, "failed to append iteration log");
                    }
                    if event.session_id.is_some() {
                        observation.conversation_id = event.session_id.clone();
                    }
                    match event.kind {
                        OutputEventKind::UsageLimit { reset_at } => {
                            observation.usage_limit.get_or_insert(reset_at);
                        }
                        OutputEventKind::RateLimit => observation.rate_limited = true,
                        OutputEventKind::Error { message } => {
                            observation.auth_failed |= classifier::is_auth_error(&message);
                            observation.last_error = Some(message);
                        }
                        OutputEventKind::Complete(completion) => {
                            if completion.is_error {
                                if let Some(text) = completion.result.as_deref() {
                                    observation.observe_text(text);
                                }
                            }
                            observation.completion = Some(completion);
                        }
                        OutputEventKind::Log => {}
                    }
                }
            }
        }

        observation.exit_code = Some(process.wait().await);
        let stderr_lines = stderr_task.await.unwrap_or_default();
        let succeeded = observation.completion.as_ref().is_some_and(|c| !c.is_error)
            && observation.exit_code == Some(0);
        if !succeeded {
            for line in &stderr_lines {
                observation.observe_text(line);
            }
            if observation.last_error.is_none() {
                observation.last_error = stderr_lines.last().cloned();
            }
        }
        Ok(observation)
    }

    fn judge(&self, agent_id: &str, obs: &RunObservation) -> Verdict {
        let failed = |error: String| Verdict {
            status: IterationStatus::Failed,
            error: Some(error),
            retryable: false,
            gated_until: None,
        };

        if obs.cancelled {
            return Verdict {
                status: IterationStatus::Cancelled,
                error: Some("cancelled".to_string()),
                retryable: false,
                gated_until: None,
            };
        }

        if let Some(reset_at) = obs.usage_limit {
            let until = self.gate.block(agent_id, reset_at, self.machine.now());
            return Verdict {
                gated_until: Some(until),
                ..failed(format!("{} usage limit reached; paused until {}", agent_id, until.to_rfc3339()))
            };
        }

        if obs.auth_failed {
            return failed(format!(
                "{} authentication failed; re-authenticate with `taskrail check --reauth {}`",
                agent_id, agent_id
            ));
        }

        if obs.rate_limited {
            return Verdict {
                retryable: true,
                ..failed(format!("{} is rate limited; retry shortly", agent_id))
            };
        }

        match &obs.completion {
            Some(c) if !c.is_error && obs.exit_code == Some(0) => Verdict {
                status: IterationStatus::NeedsReview,
                error: None,
                retryable: false,
                gated_until: None,
            },
            Some(c) if c.is_error => failed(
                c.result
                    .clone()
                    .or_else(|| obs.last_error.clone())
                    .unwrap_or_else(|| "agent reported an error".to_string()),
            ),
            _ => failed(obs.last_error.clone().unwrap_or_else(|| match obs.exit_code {
                Some(0) => "agent exited without a result".to_string(),
                Some(code) => format!("agent exited with code {}", code),
                None => "agent exited abnormally".to_string(),
            })),
        }
    }

    async fn finish_failed(
        &self,
        task: &Task,
        prompt: String,
        message: String,
    ) -> Result<RunReport, TransitionError> {
        tracing::error!(task_id = %task.id, error = %message, "iteration failed before the agent ran");
        let outcome = IterationOutcome::new(IterationStatus::Failed, prompt).with_error(message);
        let (task, iteration) = self.complete(&task.project_id, &task.id, outcome).await?;
        Ok(RunReport {
            task,
            iteration,
            retryable: false,
            gated_until: None,
        })
    }

    /// Record the iteration; a store failure still tries to mark the task failed
    async fn complete(
        &self,
        project_id: &str,
        task_id: &str,
        outcome: IterationOutcome,
    ) -> Result<(Task, Iteration), TransitionError> {
        match self.machine.complete_iteration(project_id, task_id, outcome).await {
            Ok(done) => Ok(done),
            Err(e @ TransitionError::Store(_)) => {
                tracing::error!(task_id, error = %e, "failed to record iteration");
                let task = self.machine.load(project_id, task_id).await?;
                if task.status() != TaskStatus::Failed {
                    self.machine
                        .fail(project_id, task_id, format!("could not record iteration: {}", e))
                        .await?;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

//! Picks the next queued task.

use std::sync::Arc;

use super::gate::UsageLimitGate;
use super::state::TaskStateMachine;
use crate::{Task, TaskStatus, TransitionError};

pub struct Scheduler {
    machine: TaskStateMachine,
    gate: Arc<UsageLimitGate>,
    default_agent: String,
}

impl Scheduler {
    pub fn new(machine: TaskStateMachine, gate: Arc<UsageLimitGate>, default_agent: impl Into<String>) -> Self {
        Self {
            machine,
            gate,
            default_agent: default_agent.into(),
        }
    }

    /// Claim the queued task with the lowest queue position whose agent is not
    /// gated. A concurrent pass that loses the claim on a task moves on to the
    /// next one, so no task is handed out twice.
    pub async fn claim_next(&self, project_id: &str) -> Result<Option<Task>, TransitionError> {
        let now = self.machine.now();
        let tasks = self.machine.store().list_tasks(project_id).await?;

        for task in tasks.iter().filter(|t| t.status() == TaskStatus::Queued) {
            let agent = task.agent_id.as_deref().unwrap_or(&self.default_agent);
            if let Some(until) = self.gate.blocked_until(agent, now) {
                tracing::debug!(task_id = %task.id, agent, until = %until, "skipping task, agent gated");
                continue;
            }

            match self.machine.claim(project_id, &task.id).await {
                Ok(claimed) => {
                    tracing::info!(task_id = %claimed.id, agent, "claimed task");
                    return Ok(Some(claimed));
                }
                // Someone else got there first.
                Err(TransitionError::Invalid { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::store::{JsonTaskStore, MemoryTaskStore};

    async fn queued(machine: &TaskStateMachine, prompt: &str, agent: Option<&str>) -> Task {
        let task = machine.create_task("p", prompt).await.unwrap();
        if let Some(agent) = agent {
            let mut stored = machine.load("p", &task.id).await.unwrap();
            stored.agent_id = Some(agent.to_string());
            machine.store().save_task(&stored).await.unwrap();
        }
        machine.enqueue("p", &task.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_claims_in_queue_order() {
        let machine = TaskStateMachine::new(Arc::new(MemoryTaskStore::new()));
        let scheduler = Scheduler::new(machine.clone(), Arc::new(UsageLimitGate::default()), "claude");
        let first = queued(&machine, "first", None).await;
        let second = queued(&machine, "second", None).await;
        machine.reorder("p", &second.id, -1).await.unwrap();

        let claimed = scheduler.claim_next("p").await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert_eq!(claimed.status(), TaskStatus::AwaitingAgent);
        assert!(claimed.running_session_started_at().is_some());

        assert_eq!(scheduler.claim_next("p").await.unwrap().unwrap().id, first.id);
        assert!(scheduler.claim_next("p").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_passes_claim_distinct_tasks() {
        let dir = tempfile::TempDir::new().unwrap();
        let gate = Arc::new(UsageLimitGate::default());
        // Separate store handles on one directory, as two processes would have.
        let a = TaskStateMachine::new(Arc::new(JsonTaskStore::new(dir.path())));
        let b = TaskStateMachine::new(Arc::new(JsonTaskStore::new(dir.path())));
        let first = Scheduler::new(a.clone(), gate.clone(), "claude");
        let second = Scheduler::new(b, gate.clone(), "claude");
        let shared = Scheduler::new(a.clone(), gate, "claude");

        for _ in 0..10 {
            let only = queued(&a, "only", None).await;
            let (x, y, z) = tokio::join!(first.claim_next("p"), second.claim_next("p"), shared.claim_next("p"));
            let claimed: Vec<Task> = [x, y, z].into_iter().filter_map(|r| r.unwrap()).collect();
            assert_eq!(claimed.len(), 1, "one queued task must be claimed exactly once");
            assert_eq!(claimed[0].id, only.id);
        }

        let one = queued(&a, "one", None).await;
        let two = queued(&a, "two", None).await;
        let (x, y) = tokio::join!(first.claim_next("p"), second.claim_next("p"));
        let mut ids = vec![x.unwrap().unwrap().id, y.unwrap().unwrap().id];
        ids.sort();
        let mut expected = vec![one.id, two.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_gated_agent_is_skipped() {
        let machine = TaskStateMachine::new(Arc::new(MemoryTaskStore::new()));
        let gate = Arc::new(UsageLimitGate::default());
        gate.block("claude", None, machine.now());
        let scheduler = Scheduler::new(machine.clone(), gate.clone(), "claude");

        queued(&machine, "uses claude", None).await;
        let codex = queued(&machine, "uses codex", Some("codex")).await;

        assert_eq!(scheduler.claim_next("p").await.unwrap().unwrap().id, codex.id);
        assert!(scheduler.claim_next("p").await.unwrap().is_none());

        gate.clear("claude");
        assert!(scheduler.claim_next("p").await.unwrap().is_some());
    }
}

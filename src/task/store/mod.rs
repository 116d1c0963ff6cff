//! Record store contract.
//!
//! The state machine only needs keyed load/save of tasks and projects plus an
//! append-only log per iteration. Two implementations ship: [`MemoryTaskStore`]
//! for tests and embedding, [`JsonTaskStore`] for the CLI.

mod json;
mod memory;

pub use json::JsonTaskStore;
pub use memory::MemoryTaskStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::{Project, Task, TaskPatch, TaskStatus};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load_task(&self, project_id: &str, task_id: &str) -> Result<Option<Task>>;

    /// Insert or replace
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Replace the stored task only if its status is still `expected`, as one
    /// atomic step. `false` when it changed in the meantime or does not exist.
    async fn save_task_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool>;

    /// Tasks of a project ordered by queue position, then creation time
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>>;

    async fn save_project(&self, project: &Project) -> Result<()>;

    async fn load_project(&self, project_id: &str) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Append one raw output line to the log of `iteration`
    async fn append_iteration_log(
        &self,
        project_id: &str,
        task_id: &str,
        iteration: u32,
        line: &str,
    ) -> Result<()>;

    /// Whole log of `iteration`, `None` if nothing was ever written
    async fn read_iteration_log(
        &self,
        project_id: &str,
        task_id: &str,
        iteration: u32,
    ) -> Result<Option<String>>;

    /// Apply a partial update. Returns the updated task, `None` if it does not exist.
    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Option<Task>> {
        let Some(mut task) = self.load_task(project_id, task_id).await? else {
            return Ok(None);
        };
        patch.apply(&mut task, Utc::now());
        self.save_task(&task).await?;
        Ok(Some(task))
    }
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.queue_position
            .cmp(&b.queue_position)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

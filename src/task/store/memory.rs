use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{TaskStore, sort_tasks};
use crate::{Project, Task, TaskStatus};

type Key = (String, String);

/// Store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Key, Task>>,
    projects: RwLock<HashMap<String, Project>>,
    logs: RwLock<HashMap<(String, String, u32), String>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load_task(&self, project_id: &str, task_id: &str) -> Result<Option<Task>> {
        let key = (project_id.to_string(), task_id.to_string());
        Ok(self.tasks.read().await.get(&key).cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let key = (task.project_id.clone(), task.id.clone());
        self.tasks.write().await.insert(key, task.clone());
        Ok(())
    }

    async fn save_task_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool> {
        let key = (task.project_id.clone(), task.id.clone());
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&key) {
            Some(current) if current.status() == expected => {
                *current = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn load_project(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.projects.read().await.get(project_id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    async fn append_iteration_log(
        &self,
        project_id: &str,
        task_id: &str,
        iteration: u32,
        line: &str,
    ) -> Result<()> {
        let key = (project_id.to_string(), task_id.to_string(), iteration);
        let mut logs = self.logs.write().await;
        let log = logs.entry(key).or_default();
        log.push_str(line);
        log.push('\n');
        Ok(())
    }

    async fn read_iteration_log(
        &self,
        project_id: &str,
        task_id: &str,
        iteration: u32,
    ) -> Result<Option<String>> {
        let key = (project_id.to_string(), task_id.to_string(), iteration);
        Ok(self.logs.read().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskPatch;
    use chrono::Utc;

    #[tokio::test]
    async fn test_update_task_applies_patch() {
        let store = MemoryTaskStore::new();
        let task = Task::new("t1", "p1", "old", Utc::now());
        store.save_task(&task).await.unwrap();

        let patch = TaskPatch {
            prompt: Some("new".to_string()),
            model: Some(Some("opus".to_string())),
            ..Default::default()
        };
        let updated = store.update_task("p1", "t1", patch).await.unwrap().unwrap();
        assert_eq!(updated.prompt, "new");
        assert_eq!(updated.model.as_deref(), Some("opus"));
        assert_eq!(store.load_task("p1", "t1").await.unwrap().unwrap().prompt, "new");

        let missing = store.update_task("p1", "nope", TaskPatch::default()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_queue_position() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();
        for (id, pos) in [("a", 3), ("b", 1), ("c", 2)] {
            let mut task = Task::new(id, "p1", id, now);
            task.queue_position = pos;
            store.save_task(&task).await.unwrap();
        }
        store.save_task(&Task::new("other", "p2", "x", now)).await.unwrap();

        let ids: Vec<_> = store
            .list_tasks("p1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_conditional_save_checks_status() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();
        let task = Task::new("t1", "p1", "x", now);
        store.save_task(&task).await.unwrap();

        let mut queued = task.clone();
        queued.transition(TaskStatus::Queued, now).unwrap();
        assert!(!store.save_task_if_status(&queued, TaskStatus::Queued).await.unwrap());
        assert!(store.save_task_if_status(&queued, TaskStatus::Backlog).await.unwrap());
        assert_eq!(store.load_task("p1", "t1").await.unwrap().unwrap().status(), TaskStatus::Queued);

        let missing = Task::new("nope", "p1", "x", now);
        assert!(!store.save_task_if_status(&missing, TaskStatus::Backlog).await.unwrap());
    }

    #[tokio::test]
    async fn test_iteration_logs_are_separate() {
        let store = MemoryTaskStore::new();
        store.append_iteration_log("p", "t", 1, "one").await.unwrap();
        store.append_iteration_log("p", "t", 1, "two").await.unwrap();
        store.append_iteration_log("p", "t", 2, "three").await.unwrap();
        assert_eq!(store.read_iteration_log("p", "t", 1).await.unwrap().as_deref(), Some("one\ntwo\n"));
        assert_eq!(store.read_iteration_log("p", "t", 2).await.unwrap().as_deref(), Some("three\n"));
        assert_eq!(store.read_iteration_log("p", "t", 3).await.unwrap(), None);
    }
}

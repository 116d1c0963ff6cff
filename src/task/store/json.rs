//! File-backed record store.
//!
//! Layout under the data directory:
//!
//! ```text
//! projects/<project>.json
//! tasks/<project>/<task>.json
//! logs/<project>/<task>/<iteration>.jsonl
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use super::{TaskStore, sort_tasks};
use crate::atomic_file;
use crate::{Project, Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    root: PathBuf,
}

/// Ids become path components, so anything that could escape the directory is refused.
fn component(id: &str) -> Result<&str> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        bail!("invalid record id: {:?}", id);
    }
    Ok(id)
}

/// Replace the task file only while the stored task still has status `expected`
fn write_if_status(path: &Path, content: &[u8], expected: TaskStatus) -> Result<bool> {
    let _lock = atomic_file::lock(path)?;
    let current = match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice::<Task>(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?
            .status(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if current != expected {
        return Ok(false);
    }
    atomic_file::replace(path, content)?;
    Ok(true)
}

async fn save_json<T: Serialize>(path: PathBuf, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value).context("Failed to serialize record")?;
    tokio::task::spawn_blocking(move || atomic_file::write(&path, &content))
        .await
        .context("record writer panicked")?
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Every `*.json` record directly under `dir`
async fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(record) = load_json(&path).await? {
            records.push(record);
        }
    }
    Ok(records)
}

impl JsonTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_path(&self, project_id: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join("projects")
            .join(format!("{}.json", component(project_id)?)))
    }

    fn tasks_dir(&self, project_id: &str) -> Result<PathBuf> {
        Ok(self.root.join("tasks").join(component(project_id)?))
    }

    fn task_path(&self, project_id: &str, task_id: &str) -> Result<PathBuf> {
        Ok(self
            .tasks_dir(project_id)?
            .join(format!("{}.json", component(task_id)?)))
    }

    fn log_path(&self, project_id: &str, task_id: &str, iteration: u32) -> Result<PathBuf> {
        Ok(self
            .root
            .join("logs")
            .join(component(project_id)?)
            .join(component(task_id)?)
            .join(format!("{}.jsonl", iteration)))
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn load_task(&self, project_id: &str, task_id: &str) -> Result<Option<Task>> {
        load_json(&self.task_path(project_id, task_id)?).await
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        save_json(self.task_path(&task.project_id, &task.id)?, task).await
    }

    async fn save_task_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool> {
        let path = self.task_path(&task.project_id, &task.id)?;
        let content = serde_json::to_vec_pretty(task).context("Failed to serialize record")?;
        tokio::task::spawn_blocking(move || write_if_status(&path, &content, expected))
            .await
            .context("record writer panicked")?
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = load_all(&self.tasks_dir(project_id)?).await?;
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        save_json(self.project_path(&project.id)?, project).await
    }

    async fn load_project(&self, project_id: &str) -> Result<Option<Project>> {
        load_json(&self.project_path(project_id)?).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = load_all(&self.root.join("projects")).await?;
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
        let path = self.log_path(project_id, task_id, iteration)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open log: {}", path.display()))?;
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');
        file.write_all(record.as_bytes())
            .await
            .with_context(|| format!("Failed to append to log: {}", path.display()))?;
        Ok(())
    }

    async fn read_iteration_log(
        &self,
        project_id: &str,
        task_id: &str,
        iteration: u32,
    ) -> Result<Option<String>> {
        let path = self.log_path(project_id, task_id, iteration)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(log) => Ok(Some(log)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read log: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskPatch;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_task_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut task = Task::new("t1", "p1", "write docs", now);
        task.transition(TaskStatus::Queued, now).unwrap();
        JsonTaskStore::new(dir.path()).save_task(&task).await.unwrap();

        let reopened = JsonTaskStore::new(dir.path());
        let loaded = reopened.load_task("p1", "t1").await.unwrap().expect("task on disk");
        assert_eq!(loaded.status(), TaskStatus::Queued);
        assert_eq!(loaded.prompt, "write docs");
        assert!(dir.path().join("tasks/p1/t1.json").exists());
        assert!(!dir.path().join("tasks/p1/t1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_records() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(store.load_task("p", "t").await.unwrap().is_none());
        assert!(store.list_tasks("p").await.unwrap().is_empty());
        assert!(store.list_projects().await.unwrap().is_empty());
        assert!(store.read_iteration_log("p", "t", 1).await.unwrap().is_none());
        assert!(store.update_task("p", "t", TaskPatch::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_projects_and_logs() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        store.save_project(&Project::new("web", "/srv/web")).await.unwrap();
        assert_eq!(store.list_projects().await.unwrap()[0].id, "web");

        store.append_iteration_log("web", "t1", 1, "{\"type\":\"system\"}").await.unwrap();
        store.append_iteration_log("web", "t1", 1, "plain").await.unwrap();
        let log = store.read_iteration_log("web", "t1", 1).await.unwrap().unwrap();
        assert_eq!(log, "{\"type\":\"system\"}\nplain\n");
    }

    #[tokio::test]
    async fn test_conditional_save_across_instances() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut task = Task::new("t1", "p1", "x", now);
        task.transition(TaskStatus::Queued, now).unwrap();
        JsonTaskStore::new(dir.path()).save_task(&task).await.unwrap();

        // Two handles on the same directory race for the same queued task.
        let first = JsonTaskStore::new(dir.path());
        let second = JsonTaskStore::new(dir.path());
        let mut claimed = task.clone();
        claimed.transition(TaskStatus::AwaitingAgent, now).unwrap();

        assert!(first.save_task_if_status(&claimed, TaskStatus::Queued).await.unwrap());
        assert!(!second.save_task_if_status(&claimed, TaskStatus::Queued).await.unwrap());
        assert!(!second.save_task_if_status(&Task::new("t9", "p1", "x", now), TaskStatus::Backlog).await.unwrap());

        let stored = second.load_task("p1", "t1").await.unwrap().unwrap();
        assert_eq!(stored.status(), TaskStatus::AwaitingAgent);
    }

    #[tokio::test]
    async fn test_path_escape_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(store.load_task("..", "t").await.is_err());
        assert!(store.load_task("p", "../../etc/passwd").await.is_err());
    }
}

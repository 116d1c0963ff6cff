//! Retry context built from logs persisted by the JSON store

mod common;

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use common::PROJECT;
use taskrail::task::{JsonTaskStore, TaskStateMachine, TaskStore, retry};
use taskrail::{IterationOutcome, IterationStatus};

async fn failed_task_with_log(lines: &[&str], exit_code: Option<i32>, error: &str) -> (TempDir, TaskStateMachine, String) {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(JsonTaskStore::new(dir.path()));
    let machine = TaskStateMachine::new(store.clone());

    let task = machine.create_task(PROJECT, "Port the importer to async").await.unwrap();
    machine.enqueue(PROJECT, &task.id).await.unwrap();
    machine.start_task(PROJECT, &task.id).await.unwrap();
    for line in lines {
        store.append_iteration_log(PROJECT, &task.id, 1, line).await.unwrap();
    }
    machine
        .complete_iteration(
            PROJECT,
            &task.id,
            IterationOutcome::new(IterationStatus::Failed, "Port the importer to async")
                .with_exit_code(exit_code)
                .with_error(error),
        )
        .await
        .unwrap();
    (dir, machine, task.id)
}

#[tokio::test]
async fn test_codex_log_interruption_resumes() {
    let (_dir, machine, task_id) = failed_task_with_log(
        &[
            r#"{"type":"thread.started","thread_id":"th_1"}"#,
            r#"{"type":"item.started","item":{"type":"command_execution","command":"rg importer src"}}"#,
            r#"{"type":"item.completed","item":{"type":"file_change","changes":[{"path":"src/importer.rs","kind":"update"}]}}"#,
        ],
        Some(143),
        "agent exited with code 143",
    )
    .await;

    let task = machine.load(PROJECT, &task_id).await.unwrap();
    let log = machine
        .store()
        .read_iteration_log(PROJECT, &task_id, 1)
        .await
        .unwrap()
        .expect("log was persisted");
    let ctx = retry::synthesize(&task, Some(&log));

    assert!(ctx.has_progress);
    assert_eq!(ctx.action_count, 2);
    assert!(ctx.prompt.starts_with("## Resuming interrupted work"), "{}", ctx.prompt);
    assert!(ctx.summary.contains("rg importer src"), "{}", ctx.summary);
    assert!(ctx.prompt.ends_with("## Original task\n\nPort the importer to async"));
}

#[tokio::test]
async fn test_failure_without_progress_keeps_prompt_last() {
    let (_dir, machine, task_id) = failed_task_with_log(
        &[r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"Tool permission denied"}"#],
        Some(1),
        "Tool permission denied",
    )
    .await;

    let task = machine.load(PROJECT, &task_id).await.unwrap();
    let log = machine.store().read_iteration_log(PROJECT, &task_id, 1).await.unwrap();
    let ctx = retry::synthesize(&task, log.as_deref());

    assert!(!ctx.has_progress);
    assert!(ctx.prompt.starts_with("## Previous attempt failed"), "{}", ctx.prompt);
    assert!(ctx.prompt.contains("Tool permission denied"));
    assert!(ctx.prompt.ends_with("\n\nPort the importer to async"));
    assert!(task.iterations()[0].completed_at <= Utc::now());
}

#[tokio::test]
async fn test_no_log_means_original_prompt() {
    let (_dir, machine, task_id) = failed_task_with_log(&[], None, "spawn failed").await;
    let task = machine.load(PROJECT, &task_id).await.unwrap();
    let log = machine.store().read_iteration_log(PROJECT, &task_id, 1).await.unwrap();
    assert_eq!(log, None);
    assert_eq!(retry::synthesize(&task, None).prompt, "Port the importer to async");
}

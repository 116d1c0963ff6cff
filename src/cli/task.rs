//! Task lifecycle commands

use anyhow::{Context, Result, bail};

use taskrail::agent::transcript::{self, TranscriptEntry};
use taskrail::task::RunReport;
use taskrail::{Task, TaskPatch, TaskStatus};

use super::{App, ctrl_c_cancel};

pub async fn add(
    app: &App,
    project_id: &str,
    prompt: &str,
    agent: Option<String>,
    model: Option<String>,
    queue: bool,
) -> Result<()> {
    let store = app.machine.store();
    if store.load_project(project_id).await?.is_none() {
        bail!("Unknown project '{}'. Add it with `taskrail project add`.", project_id);
    }

    let mut task = app.machine.create_task(project_id, prompt).await?;
    if agent.is_some() || model.is_some() {
        let patch = TaskPatch {
            agent_id: agent.map(Some),
            model: model.map(Some),
            ..Default::default()
        };
        if let Some(updated) = store.update_task(project_id, &task.id, patch).await? {
            task = updated;
        }
    }
    if queue {
        task = app.machine.enqueue(project_id, &task.id).await?;
    }

    println!("{} [{}]", task.id, task.status());
    Ok(())
}

pub async fn list(app: &App, project_id: &str, json: bool) -> Result<()> {
    let tasks = app.machine.store().list_tasks(project_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks.");
    }
    let now = app.machine.now();
    for task in &tasks {
        println!(
            "{:>4}  {:<14} #{:<2} {:>6}s  {}  {}",
            task.queue_position,
            task.status().as_str(),
            task.current_iteration(),
            task.live_runtime_ms(now) / 1000,
            task.id,
            first_line(&task.prompt)
        );
    }
    Ok(())
}

/// Run a task now. Backlog tasks are queued first.
pub async fn run(app: &App, project_id: &str, task_id: &str) -> Result<()> {
    let task = app.machine.load(project_id, task_id).await?;
    if task.status() == TaskStatus::Backlog {
        app.machine.enqueue(project_id, task_id).await?;
    }
    let report = app
        .executor()
        .run(project_id, task_id, ctrl_c_cancel())
        .await
        .with_context(|| format!("Failed to run task {}", task_id))?;
    print_report(&report);
    Ok(())
}

/// Claim the next runnable task of the project and run it
pub async fn next(app: &App, project_id: &str) -> Result<()> {
    let Some(task) = app.scheduler().claim_next(project_id).await? else {
        println!("Nothing to run.");
        return Ok(());
    };
    let report = app.executor().run(project_id, &task.id, ctrl_c_cancel()).await?;
    print_report(&report);
    Ok(())
}

pub async fn accept(app: &App, project_id: &str, task_id: &str) -> Result<()> {
    let task = app.machine.accept_task(project_id, task_id).await?;
    println!("{} [{}]", task.id, task.status());
    Ok(())
}

pub async fn reject(app: &App, project_id: &str, task_id: &str) -> Result<()> {
    let task = app.machine.reject_task(project_id, task_id).await?;
    println!("{} [{}]", task.id, task.status());
    Ok(())
}

pub async fn cancel(app: &App, project_id: &str, task_id: &str) -> Result<()> {
    let task = app.machine.cancel(project_id, task_id).await?;
    println!("{} [{}]", task.id, task.status());
    Ok(())
}

/// Queue another iteration, optionally with a new prompt
pub async fn retry(app: &App, project_id: &str, task_id: &str, prompt: Option<String>) -> Result<()> {
    let task = app.machine.start_new_iteration(project_id, task_id, prompt).await?;
    println!("{} [{}] iteration {}", task.id, task.status(), task.current_iteration());
    Ok(())
}

/// Print the readable transcript of one iteration (latest by default)
pub async fn log(app: &App, project_id: &str, task_id: &str, iteration: Option<u32>) -> Result<()> {
    let task = app.machine.load(project_id, task_id).await?;
    let iteration = iteration.unwrap_or_else(|| task.current_iteration());
    let Some(log) = app
        .machine
        .store()
        .read_iteration_log(project_id, task_id, iteration)
        .await?
    else {
        println!("No output recorded for iteration {}.", iteration);
        return Ok(());
    };

    for entry in transcript::parse_log(&log) {
        match entry {
            TranscriptEntry::Text(text) => println!("{}", text),
            TranscriptEntry::Tool { name, summary } => println!("  > {} {}", name, summary),
            TranscriptEntry::Result { text, is_error } => {
                let label = if is_error { "failed" } else { "done" };
                println!("== {} {}", label, text.unwrap_or_default());
            }
            TranscriptEntry::Error(message) => println!("!! {}", message),
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let task: &Task = &report.task;
    println!(
        "{} [{}] iteration {} in {}s",
        task.id,
        task.status(),
        report.iteration.iteration,
        report.iteration.runtime_ms / 1000
    );
    if let Some(error) = &report.iteration.error_message {
        println!("  error: {}", error);
    }
    if let Some(until) = report.gated_until {
        println!("  agent blocked until {}", until.to_rfc3339());
    }
    if report.retryable {
        println!("  transient failure, safe to retry");
    }
    if task.needs_continuation {
        println!(
            "  continuation suggested: {}",
            task.continuation_reason.as_deref().unwrap_or("")
        );
        for step in &task.suggested_next_steps {
            println!("    - {}", step);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

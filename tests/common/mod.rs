//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use taskrail::task::{ManualClock, MemoryTaskStore, TaskStateMachine, TaskStore};
use taskrail::Project;

pub const PROJECT: &str = "demo";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .expect("valid start time")
}

/// State machine over an in-memory store, driven by a manual clock
pub fn manual_machine() -> (TaskStateMachine, Arc<ManualClock>, Arc<MemoryTaskStore>) {
    let store = Arc::new(MemoryTaskStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let machine = TaskStateMachine::with_clock(store.clone(), clock.clone());
    (machine, clock, store)
}

pub async fn add_project(store: &dyn TaskStore, path: &std::path::Path) {
    store
        .save_project(&Project::new(PROJECT, path))
        .await
        .expect("save project");
}

/// Write an executable shell script that stands in for an agent CLI
#[cfg(unix)]
pub fn write_agent_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write agent script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod agent script");
    path
}

//! Builds the prompt for the next attempt after a failed or interrupted run.
//!
//! The previous iteration's raw log is reduced to what the agent already did
//! (tool calls), what it last reported, and how the run ended. That context is
//! framed differently for interruptions (resume, do not redo finished work)
//! and genuine failures (retry, consider another approach).

use crate::agent::transcript::{self, TranscriptEntry};
use crate::{Iteration, Task};

/// Tool calls listed in the summary; older ones are counted, not listed
pub const MAX_LISTED_ACTIONS: usize = 15;

/// Minimum length of an assistant message that counts as progress
pub const SUBSTANTIAL_MESSAGE_CHARS: usize = 100;

/// Messages opening with filler only count when at least this long
pub const BOILERPLATE_MESSAGE_CHARS: usize = 200;

const BOILERPLATE_OPENERS: &[&str] = &[
    "i'll",
    "i will",
    "let me",
    "now i",
    "now let me",
    "sure",
    "okay",
    "ok,",
    "great",
    "first, i",
];

const INTERRUPTION_WORDS: &[&str] = &[
    "timeout",
    "timed out",
    "signal",
    "sigterm",
    "sigkill",
    "sigint",
    "killed",
    "interrupted",
    "sleep",
];

/// 128 + SIGINT / SIGKILL / SIGTERM
const INTERRUPTION_EXIT_CODES: &[i32] = &[130, 137, 143];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    pub prompt: String,
    pub summary: String,
    pub action_count: usize,
    pub has_progress: bool,
}

impl RetryContext {
    fn unchanged(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            summary: String::new(),
            action_count: 0,
            has_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Interruption,
    Failure,
}

/// Retry context for `task` from the log of its last finished iteration.
pub fn synthesize(task: &Task, log: Option<&str>) -> RetryContext {
    synthesize_prompt(&task.prompt, log, task.last_iteration())
}

pub fn synthesize_prompt(prompt: &str, log: Option<&str>, previous: Option<&Iteration>) -> RetryContext {
    let Some(log) = log.filter(|l| !l.trim().is_empty()) else {
        return RetryContext::unchanged(prompt);
    };

    let entries = transcript::parse_log(log);
    let actions: Vec<&str> = entries
        .iter()
        .filter_map(|e| match e {
            TranscriptEntry::Tool { summary, .. } => Some(summary.as_str()),
            _ => None,
        })
        .collect();
    let last_message = entries.iter().rev().find_map(|e| match e {
        TranscriptEntry::Text(text) if is_substantial(text) => Some(text.trim()),
        _ => None,
    });
    let error = last_error(&entries, previous);
    let kind = failure_kind(error.as_deref(), previous.and_then(|i| i.exit_code));

    let has_progress = !actions.is_empty() || last_message.is_some();
    if !has_progress {
        return RetryContext {
            prompt: format!("{}\n\n{}", header(kind, error.as_deref(), false), prompt),
            summary: String::new(),
            action_count: 0,
            has_progress: false,
        };
    }

    let summary = summarize(&actions, last_message);
    let mut out = header(kind, error.as_deref(), true);
    out.push_str("\n\n");
    out.push_str(&summary);
    out.push_str("\n\n## Original task\n\n");
    out.push_str(prompt);

    RetryContext {
        prompt: out,
        summary,
        action_count: actions.len(),
        has_progress: true,
    }
}

pub fn is_substantial(message: &str) -> bool {
    let message = message.trim();
    let len = message.chars().count();
    if len < SUBSTANTIAL_MESSAGE_CHARS {
        return false;
    }
    let lower = message.to_lowercase();
    let boilerplate = BOILERPLATE_OPENERS.iter().any(|o| lower.starts_with(o));
    !boilerplate || len >= BOILERPLATE_MESSAGE_CHARS
}

pub fn failure_kind(error: Option<&str>, exit_code: Option<i32>) -> FailureKind {
    let by_code = exit_code.is_some_and(|c| INTERRUPTION_EXIT_CODES.contains(&c));
    let by_text = error.is_some_and(|e| {
        let lower = e.to_lowercase();
        INTERRUPTION_WORDS.iter().any(|w| lower.contains(w))
    });
    if by_code || by_text {
        FailureKind::Interruption
    } else {
        FailureKind::Failure
    }
}

fn last_error(entries: &[TranscriptEntry], previous: Option<&Iteration>) -> Option<String> {
    let from_log = entries.iter().rev().find_map(|e| match e {
        TranscriptEntry::Error(message) => Some(message.clone()),
        TranscriptEntry::Result {
            text: Some(text),
            is_error: true,
        } => Some(text.clone()),
        _ => None,
    });
    from_log.or_else(|| previous.and_then(|i| i.error_message.clone()))
}

fn summarize(actions: &[&str], last_message: Option<&str>) -> String {
    let mut summary = String::new();
    if !actions.is_empty() {
        summary.push_str(&format!("### Actions already taken ({})\n", actions.len()));
        let skipped = actions.len().saturating_sub(MAX_LISTED_ACTIONS);
        if skipped > 0 {
            summary.push_str(&format!("- … {} earlier actions\n", skipped));
        }
        for action in &actions[skipped..] {
            summary.push_str("- ");
            summary.push_str(action);
            summary.push('\n');
        }
    }
    if let Some(message) = last_message {
        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str("### Last progress update\n");
        summary.push_str(message);
        summary.push('\n');
    }
    summary.trim_end().to_string()
}

fn header(kind: FailureKind, error: Option<&str>, has_progress: bool) -> String {
    let reason = error
        .map(|e| format!("\n\nThe run ended with: {}", e.trim()))
        .unwrap_or_default();
    match (kind, has_progress) {
        (FailureKind::Interruption, true) => format!(
            "## Resuming interrupted work\n\nThe previous attempt at this task was interrupted before it finished.{} \
             Continue from where it stopped. Do not repeat work that is already done; check the current state of the files first.",
            reason
        ),
        (FailureKind::Interruption, false) => format!(
            "## Previous attempt was interrupted\n\nThe previous attempt at this task was interrupted before it made any progress.{} \
             Start the task again.",
            reason
        ),
        (FailureKind::Failure, true) => format!(
            "## Retrying after a failed attempt\n\nThe previous attempt at this task failed.{} \
             Some work was already done; review it before continuing. \
             If the same approach keeps failing, try a different one.",
            reason
        ),
        (FailureKind::Failure, false) => format!(
            "## Previous attempt failed\n\nThe previous attempt at this task failed without making progress.{} \
             Try again, and if the same approach keeps failing, try a different one.",
            reason
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(text: &str) -> String {
        serde_json::json!({"type": "assistant", "message": {"content": [{"type": "text", "text": text}]}}).to_string()
    }

    fn tool(name: &str, input: serde_json::Value) -> String {
        serde_json::json!({"type": "assistant", "message": {"content": [{"type": "tool_use", "id": "t", "name": name, "input": input}]}}).to_string()
    }

    #[test]
    fn test_missing_or_empty_log_returns_prompt_unchanged() {
        for log in [None, Some(""), Some("  \n")] {
            let ctx = synthesize_prompt("Add a cache", log, None);
            assert_eq!(ctx, RetryContext::unchanged("Add a cache"), "log {:?}", log);
        }
    }

    #[test]
    fn test_short_message_only_is_no_progress() {
        let log = assistant("Let me look.");
        let ctx = synthesize_prompt("Add a cache", Some(&log), None);
        assert!(!ctx.has_progress);
        assert_eq!(ctx.action_count, 0);
        assert!(ctx.prompt.starts_with("## Previous attempt failed"), "{}", ctx.prompt);
        assert!(ctx.prompt.ends_with("\n\nAdd a cache"));
    }

    #[test]
    fn test_actions_are_capped() {
        let log: Vec<String> = (0..20)
            .map(|i| tool("Read", serde_json::json!({"file_path": format!("f{}.rs", i)})))
            .collect();
        let ctx = synthesize_prompt("task", Some(&log.join("\n")), None);
        assert!(ctx.has_progress);
        assert_eq!(ctx.action_count, 20);
        assert!(ctx.summary.contains("- … 5 earlier actions"));
        assert!(!ctx.summary.contains("Read f4.rs"));
        assert!(ctx.summary.contains("Read f5.rs"));
        assert!(ctx.summary.contains("Read f19.rs"));
        assert!(ctx.prompt.ends_with("## Original task\n\ntask"));
    }

    #[test]
    fn test_interruption_framing() {
        let log = [
            tool("Edit", serde_json::json!({"file_path": "src/lib.rs"})),
            "Error: process killed by SIGTERM".to_string(),
        ]
        .join("\n");
        let ctx = synthesize_prompt("task", Some(&log), None);
        assert!(ctx.prompt.starts_with("## Resuming interrupted work"), "{}", ctx.prompt);
        assert!(ctx.prompt.contains("Do not repeat work"));
    }

    #[test]
    fn test_failure_framing_invites_alternative() {
        let log = [
            tool("Bash", serde_json::json!({"command": "cargo test"})),
            r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"tests failed"}"#.to_string(),
        ]
        .join("\n");
        let ctx = synthesize_prompt("task", Some(&log), None);
        assert!(ctx.prompt.starts_with("## Retrying after a failed attempt"));
        assert!(ctx.prompt.contains("tests failed"));
        assert!(ctx.prompt.contains("try a different one"));
    }

    #[test]
    fn test_substantial_messages() {
        assert!(!is_substantial("short"));
        let report = "The parser now handles nested blocks. ".repeat(3);
        assert!(is_substantial(&report));
        let filler = format!("Let me {}", "check the remaining modules one by one ".repeat(3));
        assert!(filler.chars().count() < BOILERPLATE_MESSAGE_CHARS && filler.chars().count() >= SUBSTANTIAL_MESSAGE_CHARS);
        assert!(!is_substantial(&filler));
        let long_filler = format!("Let me {}", "x".repeat(BOILERPLATE_MESSAGE_CHARS));
        assert!(is_substantial(&long_filler));
    }

    #[test]
    fn test_exit_code_marks_interruption() {
        assert_eq!(failure_kind(None, Some(143)), FailureKind::Interruption);
        assert_eq!(failure_kind(Some("syntax error"), Some(1)), FailureKind::Failure);
        assert_eq!(failure_kind(Some("Request timed out"), None), FailureKind::Interruption);
    }
}

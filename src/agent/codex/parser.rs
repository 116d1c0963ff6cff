//! Codex CLI JSON output parser
//!
//! `codex exec --json` output format:
//! - `thread.started` - carries the thread id used for `resume`
//! - `item.started` / `item.completed` - individual steps
//! - `turn.completed` / `turn.failed` - end of the run
//! - `error` - errors

use serde_json::{Value, json};

use crate::agent::chat::ChatEvent;
use crate::agent::claude::format_tool_call;
use crate::agent::transcript::TranscriptEntry;

fn str_at<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Value::as_str)
}

fn error_text(json: &Value) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| match json.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Object(inner) => inner.get("message").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Tool steps of an item, described the same way Claude tool calls are
fn item_tools(item: &Value) -> Vec<(String, String)> {
    match str_at(item, "type").unwrap_or("") {
        "command_execution" => {
            let cmd = str_at(item, "command").unwrap_or("");
            vec![("Bash".to_string(), format_tool_call("Bash", &json!({ "command": cmd })))]
        }
        "file_change" => item
            .get("changes")
            .and_then(Value::as_array)
            .map(|changes| {
                changes
                    .iter()
                    .filter_map(|c| str_at(c, "path"))
                    .map(|path| ("Edit".to_string(), format!("Edit {}", path)))
                    .collect()
            })
            .unwrap_or_default(),
        kind @ ("file_edit" | "file_create") => {
            let path = str_at(item, "path").unwrap_or("file");
            let name = if kind == "file_create" { "Write" } else { "Edit" };
            vec![(name.to_string(), format!("{} {}", name, path))]
        }
        "web_search" => {
            let query = str_at(item, "query").unwrap_or("");
            vec![("WebSearch".to_string(), format!("WebSearch: {}", query))]
        }
        _ => Vec::new(),
    }
}

/// Transcript entries carried by one record
pub fn transcript(json: &Value) -> Vec<TranscriptEntry> {
    let event_type = str_at(json, "type").unwrap_or("");
    let item = json.get("item").unwrap_or(&Value::Null);
    let item_type = str_at(item, "type").unwrap_or("");

    match event_type {
        "item.completed" if item_type == "agent_message" => str_at(item, "text")
            .filter(|t| !t.trim().is_empty())
            .map(|t| vec![TranscriptEntry::Text(t.to_string())])
            .unwrap_or_default(),
        // Commands are reported when they start, file changes once applied.
        "item.started" if item_type == "command_execution" => tool_entries(item),
        "item.completed" if item_type != "command_execution" => tool_entries(item),
        "message" if str_at(json, "role") == Some("assistant") => str_at(json, "content")
            .map(|t| vec![TranscriptEntry::Text(t.to_string())])
            .unwrap_or_default(),
        "turn.completed" => vec![TranscriptEntry::Result {
            text: None,
            is_error: false,
        }],
        "turn.failed" | "error" => vec![TranscriptEntry::Error(error_text(json))],
        _ => Vec::new(),
    }
}

fn tool_entries(item: &Value) -> Vec<TranscriptEntry> {
    item_tools(item)
        .into_iter()
        .map(|(name, summary)| TranscriptEntry::Tool { name, summary })
        .collect()
}

/// Chat events for one record. Codex sends whole messages, so each agent
/// message becomes a single delta.
pub fn chat_events(json: &Value) -> Vec<ChatEvent> {
    transcript(json)
        .into_iter()
        .filter_map(|entry| match entry {
            TranscriptEntry::Text(text) => Some(ChatEvent::TextDelta { text }),
            TranscriptEntry::Tool { name, summary } => Some(ChatEvent::ToolUse { name, summary }),
            _ => None,
        })
        .collect()
}

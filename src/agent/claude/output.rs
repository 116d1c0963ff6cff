//! Claude Code stream-json records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool_format::format_tool_call;
use crate::agent::chat::ChatEvent;
use crate::agent::transcript::TranscriptEntry;

/// Records from the Claude stream-json output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Assistant message (text or tool use)
    Assistant {
        #[serde(default)]
        message: Message,
    },

    /// User message (usually tool results)
    User {
        #[serde(default)]
        message: Message,
    },

    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    /// Partial message chunk, only with `--include-partial-messages`
    StreamEvent { event: PartialEvent },

    Error {
        #[serde(default)]
        error: Value,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Content block (text or tool use)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub delta: Option<Delta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl StreamEvent {
    pub fn from_json(json: &Value) -> Option<Self> {
        serde_json::from_value(json.clone()).ok()
    }
}

/// Transcript entries carried by one record
pub fn transcript(json: &Value) -> Vec<TranscriptEntry> {
    match StreamEvent::from_json(json) {
        Some(StreamEvent::Assistant { message }) => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => {
                    Some(TranscriptEntry::Text(text))
                }
                ContentBlock::ToolUse { name, input, .. } => Some(TranscriptEntry::Tool {
                    summary: format_tool_call(&name, &input),
                    name,
                }),
                _ => None,
            })
            .collect(),
        Some(StreamEvent::Result {
            subtype,
            result,
            is_error,
        }) => vec![TranscriptEntry::Result {
            text: result,
            is_error: is_error || subtype.is_some_and(|s| s.starts_with("error")),
        }],
        Some(StreamEvent::Error { error, message }) => {
            let text = match error {
                Value::String(s) => Some(s),
                Value::Object(ref inner) => inner
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            }
            .or(message)
            .unwrap_or_else(|| "unknown error".to_string());
            vec![TranscriptEntry::Error(text)]
        }
        _ => Vec::new(),
    }
}

/// Text deltas and tool calls for chat. Full assistant text is skipped since
/// the same text already arrived as deltas.
pub fn chat_events(json: &Value) -> Vec<ChatEvent> {
    match StreamEvent::from_json(json) {
        Some(StreamEvent::StreamEvent { event }) => event
            .delta
            .filter(|d| d.kind == "text_delta")
            .and_then(|d| d.text)
            .map(|text| vec![ChatEvent::TextDelta { text }])
            .unwrap_or_default(),
        Some(StreamEvent::Assistant { message }) => message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { name, input, .. } => Some(ChatEvent::ToolUse {
                    summary: format_tool_call(&name, &input),
                    name,
                }),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_blocks_do_not_break_parsing() {
        let record = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Done."}
            ]}
        });
        assert_eq!(transcript(&record), vec![TranscriptEntry::Text("Done.".to_string())]);
    }

    #[test]
    fn test_error_result_subtype() {
        let record = json!({"type": "result", "subtype": "error_max_turns"});
        assert_eq!(
            transcript(&record),
            vec![TranscriptEntry::Result {
                text: None,
                is_error: true
            }]
        );
    }

    #[test]
    fn test_chat_events() {
        let delta = json!({
            "type": "stream_event",
            "event": {"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Hel"}}
        });
        assert_eq!(
            chat_events(&delta),
            vec![ChatEvent::TextDelta {
                text: "Hel".to_string()
            }]
        );

        let tool = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "Hello"},
                {"type": "tool_use", "id": "t", "name": "Bash", "input": {"command": "ls"}}
            ]}
        });
        assert_eq!(
            chat_events(&tool),
            vec![ChatEvent::ToolUse {
                name: "Bash".to_string(),
                summary: "Bash: ls".to_string()
            }]
        );

        assert!(chat_events(&json!({"type": "system", "subtype": "init"})).is_empty());
    }
}

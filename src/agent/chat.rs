//! Multi-turn chat over an agent process.

use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use super::error::AdapterError;
use super::process::AgentProcess;
use super::stream::{WireDialect, classify_line, lines};
use crate::OutputEvent;

/// Events surfaced to an interactive caller
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The vendor assigned (or confirmed) a conversation id
    Session { conversation_id: String },
    TextDelta { text: String },
    ToolUse { name: String, summary: String },
    /// The classified line itself
    Output(OutputEvent),
}

/// Vendor hook turning one JSON record into text/tool events
pub type ChatExtractor = fn(&Value) -> Vec<ChatEvent>;

/// A running chat turn. The conversation id observed on the wire is kept so
/// the next turn can resume it. Stderr is drained in the background so a chatty
/// agent never blocks on a full pipe.
pub struct ChatSession {
    pub process: AgentProcess,
    pub events: BoxStream<'static, ChatEvent>,
    conversation_id: Arc<Mutex<Option<String>>>,
    last_stderr: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("process", &self.process)
            .field("conversation_id", &self.conversation_id())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Wrap `process`, reading its stdout. `conversation_id` is the id being resumed.
    pub fn start(
        mut process: AgentProcess,
        dialect: &'static WireDialect,
        extract: ChatExtractor,
        conversation_id: Option<String>,
    ) -> Result<Self, AdapterError> {
        let stdout = process.take_stdout().ok_or(AdapterError::MissingPipe("stdout"))?;
        let last_stderr = Arc::new(Mutex::new(None));
        if let Some(stderr) = process.take_stderr() {
            let last = Arc::clone(&last_stderr);
            let pid = process.pid();
            tokio::spawn(async move {
                let mut stderr = lines(stderr);
                while let Some(line) = stderr.next().await {
                    tracing::debug!(pid = ?pid, line = %line, "chat stderr");
                    *last.lock().unwrap_or_else(|e| e.into_inner()) = Some(line);
                }
            });
        }
        let shared = Arc::new(Mutex::new(conversation_id));
        let tracker = Arc::clone(&shared);

        let events = lines(stdout)
            .flat_map(move |line| {
                let output = classify_line(&line, dialect);
                let mut events = Vec::new();

                if let Some(id) = output.session_id.as_deref() {
                    let mut current = tracker.lock().unwrap_or_else(|e| e.into_inner());
                    if current.as_deref() != Some(id) {
                        *current = Some(id.to_string());
                        events.push(ChatEvent::Session {
                            conversation_id: id.to_string(),
                        });
                    }
                }
                if let Ok(json) = serde_json::from_str::<Value>(&line) {
                    events.extend(extract(&json));
                }
                events.push(ChatEvent::Output(output));
                stream::iter(events)
            })
            .boxed();

        Ok(Self {
            process,
            events,
            conversation_id: shared,
            last_stderr,
        })
    }

    /// Last line the agent wrote to stderr so far
    pub fn last_stderr(&self) -> Option<String> {
        self.last_stderr.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Latest conversation id, for `--resume` on the next turn
    pub fn conversation_id(&self) -> Option<String> {
        self.conversation_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

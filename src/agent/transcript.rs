//! Vendor-neutral view of a captured iteration log.

use serde_json::Value;

use super::classifier;
use super::{claude, codex};

/// One meaningful step of an agent run
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    /// Complete assistant message
    Text(String),
    /// Tool invocation with its one-line description
    Tool { name: String, summary: String },
    /// Final record of the run
    Result { text: Option<String>, is_error: bool },
    Error(String),
}

/// Parse every line of `log`. Records of either vendor are understood; free
/// text only contributes when it reads like an error.
pub fn parse_log(log: &str) -> Vec<TranscriptEntry> {
    log.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(parse_line)
        .collect()
}

pub fn parse_line(line: &str) -> Vec<TranscriptEntry> {
    match serde_json::from_str::<Value>(line) {
        Ok(json) if json.is_object() => {
            let mut entries = claude::transcript(&json);
            if entries.is_empty() {
                entries = codex::transcript(&json);
            }
            entries
        }
        _ if classifier::is_generic_error(line) => vec![TranscriptEntry::Error(line.to_string())],
        _ => Vec::new(),
    }
}

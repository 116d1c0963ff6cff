//! Line classification: structured JSON first, keyword heuristics as fallback.

use serde_json::Value;

use super::dialect::WireDialect;
use crate::agent::classifier;
use crate::{Completion, OutputEvent, OutputEventKind, TokenUsage};

/// Classify one complete line. Never fails: anything that is not a JSON object
/// is run through the text heuristics.
pub fn classify_line(line: &str, dialect: &WireDialect) -> OutputEvent {
    match serde_json::from_str::<Value>(line) {
        Ok(json) if json.is_object() => classify_record(&json, line, dialect),
        _ => {
            tracing::trace!(dialect = dialect.name, "unstructured output line");
            classify_text(line)
        }
    }
}

/// Heuristic classification of free text, precedence usage-limit, rate-limit,
/// generic error, log.
pub fn classify_text(line: &str) -> OutputEvent {
    OutputEvent::new(text_kind(line), line)
}

fn text_kind(text: &str) -> OutputEventKind {
    let usage = classifier::detect_usage_limit(text);
    if usage.is_usage_limit {
        OutputEventKind::UsageLimit {
            reset_at: usage.reset_at,
        }
    } else if classifier::is_rate_limit(text) {
        OutputEventKind::RateLimit
    } else if classifier::is_generic_error(text) {
        OutputEventKind::Error {
            message: text.to_string(),
        }
    } else {
        OutputEventKind::Log
    }
}

fn classify_record(json: &Value, line: &str, dialect: &WireDialect) -> OutputEvent {
    let record_type = json.get("type").and_then(Value::as_str).unwrap_or("");
    let session_id = session_id(json, dialect);

    let kind = if dialect.is_error(record_type) {
        let message = error_message(json).unwrap_or_else(|| line.to_string());
        let usage = classifier::detect_usage_limit(&message);
        if usage.is_usage_limit {
            OutputEventKind::UsageLimit {
                reset_at: usage.reset_at,
            }
        } else if classifier::is_rate_limit(&message) {
            OutputEventKind::RateLimit
        } else {
            OutputEventKind::Error { message }
        }
    } else if dialect.is_result(record_type) {
        OutputEventKind::Complete(completion(json, dialect))
    } else {
        OutputEventKind::Log
    };

    OutputEvent::new(kind, line).with_session_id(session_id)
}

/// Conversation id carried by a record, if any
pub fn session_id(json: &Value, dialect: &WireDialect) -> Option<String> {
    dialect
        .session_fields
        .iter()
        .find_map(|field| json.get(*field).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// `error` / `message` as a string, or nested `{ "message": ... }`
fn error_message(json: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|field| match json.get(*field)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(inner) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn completion(json: &Value, dialect: &WireDialect) -> Completion {
    let is_error = json.get("is_error").and_then(Value::as_bool).unwrap_or(false)
        || json
            .get("subtype")
            .and_then(Value::as_str)
            .is_some_and(|s| s.starts_with("error"));

    Completion {
        result: json.get("result").and_then(Value::as_str).map(str::to_string),
        is_error,
        usage: json.get("usage").filter(|u| u.is_object()).map(|usage| {
            let field = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
            TokenUsage {
                input_tokens: field(dialect.input_tokens_field),
                output_tokens: field(dialect.output_tokens_field),
                cache_creation_input_tokens: field(dialect.cache_creation_field),
                cache_read_input_tokens: field(dialect.cache_read_field),
            }
        }),
        cost_usd: json.get(dialect.cost_field).and_then(Value::as_f64),
    }
}

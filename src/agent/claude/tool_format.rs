//! One-line descriptions of Claude tool calls

use serde_json::Value;

const MAX_COMMAND_CHARS: usize = 120;

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max && !text.contains('\n') {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(max).collect();
    format!("{}…", cut)
}

/// Format a tool call for display
pub fn format_tool_call(name: &str, input: &Value) -> String {
    let path = || str_field(input, "file_path").or_else(|| str_field(input, "path"));
    match name {
        "Read" | "Write" | "Edit" | "MultiEdit" => match path() {
            Some(path) => format!("{} {}", name, path),
            None => format!("{} file", name),
        },
        "NotebookEdit" => match str_field(input, "notebook_path") {
            Some(path) => format!("NotebookEdit {}", path),
            None => "NotebookEdit notebook".to_string(),
        },
        "Bash" => match str_field(input, "command") {
            Some(cmd) => format!("Bash: {}", truncate(cmd, MAX_COMMAND_CHARS)),
            None => "Bash command".to_string(),
        },
        "Glob" | "Grep" => match str_field(input, "pattern") {
            Some(pattern) => format!("{}: {}", name, pattern),
            None => format!("{} search", name),
        },
        "LS" => match path() {
            Some(path) => format!("LS {}", path),
            None => "LS".to_string(),
        },
        "TodoWrite" => {
            let count = input.get("todos").and_then(Value::as_array).map_or(0, Vec::len);
            format!("TodoWrite ({} items)", count)
        }
        "Task" => match str_field(input, "description") {
            Some(desc) => format!("Task: {}", truncate(desc, MAX_COMMAND_CHARS)),
            None => "Task".to_string(),
        },
        "WebFetch" => match str_field(input, "url") {
            Some(url) => format!("WebFetch {}", url),
            None => "WebFetch".to_string(),
        },
        "WebSearch" => match str_field(input, "query") {
            Some(query) => format!("WebSearch: {}", query),
            None => "WebSearch".to_string(),
        },
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_tool_call() {
        assert_eq!(format_tool_call("Read", &json!({"file_path": "src/lib.rs"})), "Read src/lib.rs");
        assert_eq!(format_tool_call("Edit", &json!({})), "Edit file");
        assert_eq!(format_tool_call("Bash", &json!({"command": "cargo test"})), "Bash: cargo test");
        assert_eq!(format_tool_call("Grep", &json!({"pattern": "fn main"})), "Grep: fn main");
        assert_eq!(format_tool_call("TodoWrite", &json!({"todos": [{}, {}]})), "TodoWrite (2 items)");
        assert_eq!(format_tool_call("mcp__custom", &json!({})), "mcp__custom");
    }

    #[test]
    fn test_long_commands_are_truncated() {
        let cmd = "x".repeat(300);
        let formatted = format_tool_call("Bash", &json!({ "command": cmd }));
        assert!(formatted.ends_with('…'));
        assert_eq!(formatted.chars().count(), "Bash: ".len() + MAX_COMMAND_CHARS + 1);

        let multi = format_tool_call("Bash", &json!({"command": "echo a\necho b"}));
        assert_eq!(multi, "Bash: echo a…");
    }
}

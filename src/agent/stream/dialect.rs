//! Vendor-specific record names for the JSON-lines wire format.

/// Field and discriminator names one vendor uses for its JSON-lines output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireDialect {
    pub name: &'static str,
    /// `type` values of the final record
    pub result_types: &'static [&'static str],
    /// `type` values of error records
    pub error_types: &'static [&'static str],
    /// Fields that may carry the conversation id, checked in order
    pub session_fields: &'static [&'static str],
    pub input_tokens_field: &'static str,
    pub output_tokens_field: &'static str,
    pub cache_creation_field: &'static str,
    pub cache_read_field: &'static str,
    pub cost_field: &'static str,
}

/// Claude Code `--output-format stream-json`
pub const CLAUDE: WireDialect = WireDialect {
    name: "claude",
    result_types: &["result"],
    error_types: &["error"],
    session_fields: &["session_id"],
    input_tokens_field: "input_tokens",
    output_tokens_field: "output_tokens",
    cache_creation_field: "cache_creation_input_tokens",
    cache_read_field: "cache_read_input_tokens",
    cost_field: "total_cost_usd",
};

/// Codex `exec --json`
pub const CODEX: WireDialect = WireDialect {
    name: "codex",
    result_types: &["turn.completed"],
    error_types: &["error", "turn.failed"],
    session_fields: &["thread_id", "session_id"],
    input_tokens_field: "input_tokens",
    output_tokens_field: "output_tokens",
    cache_creation_field: "cache_creation_input_tokens",
    cache_read_field: "cached_input_tokens",
    cost_field: "total_cost_usd",
};

impl WireDialect {
    pub fn is_result(&self, record_type: &str) -> bool {
        self.result_types.contains(&record_type)
    }

    pub fn is_error(&self, record_type: &str) -> bool {
        self.error_types.contains(&record_type)
    }
}

//! Claude Code agent module
//!
//! This module contains the Claude Code CLI adapter and its stream-json record types.

mod adapter;
mod output;
mod tool_format;

pub use adapter::ClaudeAdapter;
pub use output::transcript;
pub use tool_format::format_tool_call;

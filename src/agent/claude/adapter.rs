//! Claude Code agent adapter

use async_trait::async_trait;

use crate::agent::adapter::{AgentAdapter, CliCore, Invocation, InvokeOptions};
use crate::agent::chat::ChatExtractor;
use crate::agent::models::{CLAUDE_DEFAULT_MODEL, CLAUDE_MODELS};
use crate::agent::process::prompt_via_stdin;
use crate::agent::resolver::CliResolver;
use crate::agent::stream::CLAUDE;

const PROBE_PROMPT: &str = "Reply with OK";

pub struct ClaudeAdapter {
    id: String,
    core: CliCore,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self::with_core(
            CliCore::new(CliResolver::claude(), &CLAUDE)
                .with_models(CLAUDE_MODELS.iter().copied(), Some(CLAUDE_DEFAULT_MODEL.to_string())),
        )
    }

    pub fn with_core(core: CliCore) -> Self {
        Self {
            id: "claude".to_string(),
            core,
        }
    }

    /// Build command arguments
    fn build_args(&self, options: &InvokeOptions, partial_messages: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];

        if partial_messages {
            args.push("--include-partial-messages".to_string());
        }

        if let Some(session_id) = options.conversation_id.as_deref() {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }

        if let Some(model) = options.model.as_deref() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        for dir in &options.extra_dirs {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }

        args
    }

    fn with_prompt(mut args: Vec<String>, prompt: &str) -> Invocation {
        if prompt_via_stdin() {
            return Invocation {
                args,
                stdin: Some(prompt.to_string()),
            };
        }
        // --add-dir is variadic and would swallow the prompt without an explicit end of options.
        args.push("--".to_string());
        args.push(prompt.to_string());
        Invocation { args, stdin: None }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for ClaudeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn core(&self) -> &CliCore {
        &self.core
    }

    fn build_invocation(&self, prompt: &str, options: &InvokeOptions) -> Invocation {
        Self::with_prompt(self.build_args(options, false), prompt)
    }

    fn build_chat_invocation(&self, message: &str, options: &InvokeOptions) -> Invocation {
        Self::with_prompt(self.build_args(options, true), message)
    }

    fn chat_extractor(&self) -> ChatExtractor {
        super::output::chat_events
    }

    fn probe_args(&self) -> Vec<String> {
        vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--".to_string(),
            PROBE_PROMPT.to_string(),
        ]
    }

    fn login_args(&self) -> Vec<String> {
        vec!["/login".to_string()]
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;

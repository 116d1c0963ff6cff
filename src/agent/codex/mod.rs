//! Codex CLI agent adapter

mod parser;

pub use parser::transcript;

use async_trait::async_trait;

use crate::agent::adapter::{AgentAdapter, CliCore, Invocation, InvokeOptions};
use crate::agent::chat::ChatExtractor;
use crate::agent::models::{CODEX_DEFAULT_MODEL, CODEX_MODELS};
use crate::agent::resolver::CliResolver;
use crate::agent::stream::CODEX;

const PROBE_PROMPT: &str = "Reply with OK";

/// Codex CLI agent adapter
///
/// Codex CLI uses `codex exec --json` for non-interactive mode. The prompt
/// always goes through stdin (`-`).
pub struct CodexAdapter {
    id: String,
    core: CliCore,
}

impl CodexAdapter {
    pub fn new() -> Self {
        Self::with_core(
            CliCore::new(CliResolver::codex(), &CODEX)
                .with_models(CODEX_MODELS.iter().copied(), Some(CODEX_DEFAULT_MODEL.to_string())),
        )
    }

    pub fn with_core(core: CliCore) -> Self {
        Self {
            id: "codex".to_string(),
            core,
        }
    }

    fn build_args(&self, options: &InvokeOptions) -> Vec<String> {
        // Global flags must come before `exec`.
        let mut args: Vec<String> = vec![
            "--dangerously-bypass-approvals-and-sandbox".to_string(),
            "exec".to_string(),
            "--json".to_string(),
            // Always allow running outside a git repo (e.g., temp dirs in tests).
            "--skip-git-repo-check".to_string(),
        ];

        if let Some(model) = options.model.as_deref() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        for dir in &options.extra_dirs {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }

        if let Some(thread_id) = options.conversation_id.as_deref() {
            args.push("resume".to_string());
            args.push(thread_id.to_string());
        }

        args.push("-".to_string());
        args
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentAdapter for CodexAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn core(&self) -> &CliCore {
        &self.core
    }

    fn build_invocation(&self, prompt: &str, options: &InvokeOptions) -> Invocation {
        Invocation {
            args: self.build_args(options),
            stdin: Some(prompt.to_string()),
        }
    }

    fn build_chat_invocation(&self, message: &str, options: &InvokeOptions) -> Invocation {
        self.build_invocation(message, options)
    }

    fn chat_extractor(&self) -> ChatExtractor {
        parser::chat_events
    }

    fn probe_args(&self) -> Vec<String> {
        vec![
            "exec".to_string(),
            "--json".to_string(),
            "--skip-git-repo-check".to_string(),
            PROBE_PROMPT.to_string(),
        ]
    }

    fn auth_probe_args(&self) -> Vec<String> {
        vec!["login".to_string(), "status".to_string()]
    }

    fn login_args(&self) -> Vec<String> {
        vec!["login".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_arguments() {
        let adapter = CodexAdapter::new();
        let options = InvokeOptions {
            model: Some("o3".to_string()),
            ..Default::default()
        };
        let invocation = adapter.build_invocation("write tests", &options);
        assert_eq!(
            invocation.args,
            vec![
                "--dangerously-bypass-approvals-and-sandbox",
                "exec",
                "--json",
                "--skip-git-repo-check",
                "--model",
                "o3",
                "-",
            ]
        );
        assert_eq!(invocation.stdin.as_deref(), Some("write tests"));
    }

    #[test]
    fn test_resume_precedes_stdin_marker() {
        let adapter = CodexAdapter::new();
        let options = InvokeOptions {
            conversation_id: Some("th_9".to_string()),
            ..Default::default()
        };
        let args = adapter.build_chat_invocation("more", &options).args;
        let n = args.len();
        assert_eq!(&args[n - 3..], &["resume", "th_9", "-"]);
    }

    #[test]
    fn test_auth_probe_uses_login_status() {
        assert_eq!(CodexAdapter::new().auth_probe_args(), vec!["login", "status"]);
    }
}

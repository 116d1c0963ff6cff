//! The vendor-neutral adapter interface.
//!
//! A vendor adapter only decides how its CLI is found and which arguments it
//! takes. Everything else (path cache, launching, stream parsing, probes, the
//! model registry) lives in [`CliCore`], which every adapter owns one of.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::chat::{ChatExtractor, ChatSession};
use super::error::AdapterError;
use super::models::ModelRegistry;
use super::probe::{self, AuthStatus, HealthStatus};
use super::process::{self, AgentProcess, Launch};
use super::resolver::{CliResolver, ExecutionPlan, resolve_execution};
use super::stream::{self, EventStream, WireDialect};
use crate::UsageLimitResult;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call options for `invoke` and `chat`
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Concrete model id; aliases are resolved by the caller
    pub model: Option<String>,
    pub conversation_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub extra_dirs: Vec<PathBuf>,
    pub env: HashMap<String, String>,
}

/// Vendor arguments for one process, plus the prompt if it goes through stdin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

/// Shared state and helpers composed into every adapter
#[derive(Debug)]
pub struct CliCore {
    resolver: CliResolver,
    dialect: &'static WireDialect,
    custom_path: RwLock<Option<PathBuf>>,
    resolved: RwLock<Option<PathBuf>>,
    model_ids: Vec<String>,
    default_model: Option<String>,
    models: RwLock<Option<ModelRegistry>>,
    probe_timeout: Duration,
}

impl CliCore {
    pub fn new(resolver: CliResolver, dialect: &'static WireDialect) -> Self {
        Self {
            resolver,
            dialect,
            custom_path: RwLock::new(None),
            resolved: RwLock::new(None),
            model_ids: Vec::new(),
            default_model: None,
            models: RwLock::new(None),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_models<I, S>(mut self, ids: I, default_model: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_ids = ids.into_iter().map(Into::into).collect();
        self.default_model = default_model;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn dialect(&self) -> &'static WireDialect {
        self.dialect
    }

    pub fn binary(&self) -> &str {
        self.resolver.binary()
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Cached path, or discover it. A custom path wins when it exists.
    pub async fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = self.resolved_path() {
            return Some(path);
        }

        let custom = self
            .custom_path
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let found = match custom {
            Some(path) if path.is_file() => Some(path),
            Some(path) => {
                tracing::warn!(
                    agent = self.binary(),
                    path = %path.display(),
                    "configured binary does not exist, falling back to discovery"
                );
                self.resolver.resolve().await
            }
            None => self.resolver.resolve().await,
        };

        match &found {
            Some(path) => tracing::debug!(agent = self.binary(), path = %path.display(), "resolved agent executable"),
            None => tracing::debug!(agent = self.binary(), "agent executable not found"),
        }
        *self.resolved.write().unwrap_or_else(|e| e.into_inner()) = found.clone();
        found
    }

    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.resolved
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Set or clear a user-supplied binary. Drops the cached resolution.
    pub fn set_custom_path(&self, path: Option<PathBuf>) {
        *self.custom_path.write().unwrap_or_else(|e| e.into_inner()) = path;
        *self.resolved.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Execution plan for the cached path; never discovers
    pub fn plan(&self) -> Result<ExecutionPlan, AdapterError> {
        self.resolved_path()
            .map(|path| resolve_execution(&path))
            .ok_or_else(|| AdapterError::NotResolved {
                agent: self.binary().to_string(),
            })
    }

    pub fn launch(&self, invocation: Invocation, options: &InvokeOptions) -> Result<AgentProcess, AdapterError> {
        let mut launch = Launch::new(self.plan()?, invocation.args);
        launch.cwd = options.cwd.clone();
        launch.env = options.env.clone();
        launch.stdin = invocation.stdin;
        process::spawn(launch)
    }

    pub async fn probe(&self, args: &[String]) -> Option<probe::ProbeOutput> {
        let plan = match self.resolve().await {
            Some(path) => resolve_execution(&path),
            None => return None,
        };
        probe::run(&plan, args, self.probe_timeout).await
    }

    pub fn models(&self) -> ModelRegistry {
        if let Some(models) = self.models.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return models.clone();
        }
        let registry = ModelRegistry::new(self.model_ids.iter().cloned(), self.default_model.clone());
        *self.models.write().unwrap_or_else(|e| e.into_inner()) = Some(registry.clone());
        registry
    }
}

/// A CLI-based coding agent
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn core(&self) -> &CliCore;

    /// Arguments for a one-shot run
    fn build_invocation(&self, prompt: &str, options: &InvokeOptions) -> Invocation;

    /// Arguments for a chat turn, resuming `conversation_id` when given
    fn build_chat_invocation(&self, message: &str, options: &InvokeOptions) -> Invocation;

    /// Record hook for chat text/tool events
    fn chat_extractor(&self) -> ChatExtractor;

    /// Short non-interactive run used by the usage probe
    fn probe_args(&self) -> Vec<String>;

    fn auth_probe_args(&self) -> Vec<String> {
        self.probe_args()
    }

    /// Arguments of the interactive login command
    fn login_args(&self) -> Vec<String>;

    async fn resolve_executable(&self) -> Option<PathBuf> {
        self.core().resolve().await
    }

    fn resolved_path(&self) -> Option<PathBuf> {
        self.core().resolved_path()
    }

    fn set_custom_path(&self, path: Option<PathBuf>) {
        self.core().set_custom_path(path)
    }

    /// Start a run. Fails fast unless `resolve_executable` succeeded earlier.
    fn invoke(&self, prompt: &str, options: &InvokeOptions) -> Result<AgentProcess, AdapterError> {
        tracing::debug!(agent = self.id(), model = ?options.model, resume = ?options.conversation_id, "invoking agent");
        self.core()
            .launch(self.build_invocation(prompt, options), options)
    }

    fn parse_output(&self, reader: Box<dyn AsyncRead + Send + Unpin>) -> EventStream {
        stream::parse_output(reader, self.core().dialect())
    }

    fn chat(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        options: &InvokeOptions,
    ) -> Result<ChatSession, AdapterError> {
        let mut options = options.clone();
        options.conversation_id = conversation_id.map(str::to_string);
        let process = self
            .core()
            .launch(self.build_chat_invocation(message, &options), &options)?;
        ChatSession::start(
            process,
            self.core().dialect(),
            self.chat_extractor(),
            options.conversation_id,
        )
    }

    async fn check_usage_limits(&self) -> UsageLimitResult {
        let output = self.core().probe(&self.probe_args()).await;
        probe::usage_status(output.as_ref())
    }

    async fn validate_auth(&self) -> AuthStatus {
        let output = self.core().probe(&self.auth_probe_args()).await;
        probe::auth_status(output.as_ref())
    }

    async fn health_check(&self) -> HealthStatus {
        let Some(path) = self.core().resolve().await else {
            return HealthStatus::unavailable();
        };
        let output = self.core().probe(&["--version".to_string()]).await;
        HealthStatus {
            available: output.as_ref().is_none_or(|o| o.success()),
            version: output.as_ref().and_then(probe::version_line),
            path: Some(path),
        }
    }

    /// Open the vendor login flow in a terminal window
    fn trigger_reauth(&self) -> Result<(), AdapterError> {
        let plan = self.core().plan()?;
        probe::open_login_terminal(&plan, &self.login_args())
    }

    fn models(&self) -> ModelRegistry {
        self.core().models()
    }
}

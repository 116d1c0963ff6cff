//! Short non-interactive diagnostic runs of an agent CLI.
//!
//! Probes never fail: a missing binary, a spawn error or a timeout all turn
//! into a conservative value so a stuck diagnostic cannot block scheduling.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use super::classifier;
use super::error::AdapterError;
use super::process::NON_INTERACTIVE_ENV;
use super::resolver::ExecutionPlan;
use crate::UsageLimitResult;

/// Captured output of a finished probe
#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub text: String,
}

impl ProbeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub message: Option<String>,
}

impl AuthStatus {
    pub fn ok() -> Self {
        Self {
            authenticated: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            path: None,
            version: None,
        }
    }
}

/// Run `plan` with `args` and collect its output. `None` on spawn failure or
/// when `timeout` elapses; the process is killed in that case.
pub async fn run(plan: &ExecutionPlan, args: &[String], timeout: Duration) -> Option<ProbeOutput> {
    let mut command = Command::new(&plan.command);
    command
        .args(&plan.prepend_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(NON_INTERACTIVE_ENV.iter().copied())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            if !output.stderr.is_empty() {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&String::from_utf8_lossy(&output.stderr));
            }
            Some(ProbeOutput {
                exit_code: output.status.code(),
                text,
            })
        }
        Ok(Err(e)) => {
            tracing::warn!(command = %plan.command.display(), error = %e, "probe failed to start");
            None
        }
        Err(_) => {
            // Dropping the output future kills the child (kill_on_drop).
            tracing::warn!(
                command = %plan.command.display(),
                timeout_secs = timeout.as_secs(),
                "probe timed out, assuming OK"
            );
            None
        }
    }
}

/// Auth verdict from a probe. Only explicit auth wording counts as a failure.
pub fn auth_status(output: Option<&ProbeOutput>) -> AuthStatus {
    match output {
        Some(out) if classifier::is_auth_error(&out.text) => {
            AuthStatus::failed(first_line_matching(&out.text, classifier::is_auth_error))
        }
        _ => AuthStatus::ok(),
    }
}

pub fn usage_status(output: Option<&ProbeOutput>) -> UsageLimitResult {
    output
        .map(|out| classifier::detect_usage_limit(&out.text))
        .unwrap_or_else(UsageLimitResult::none)
}

/// First non-empty line of `--version` output
pub fn version_line(output: &ProbeOutput) -> Option<String> {
    output
        .text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn first_line_matching(text: &str, pred: fn(&str) -> bool) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| pred(l))
        .unwrap_or_else(|| text.trim())
        .to_string()
}

/// Quote one word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Open an interactive terminal window running `plan` + `args`, detached.
pub fn open_login_terminal(plan: &ExecutionPlan, args: &[String]) -> Result<(), AdapterError> {
    let words: Vec<String> = std::iter::once(plan.command.display().to_string())
        .chain(plan.prepend_args.iter().cloned())
        .chain(args.iter().cloned())
        .collect();
    let command_line = words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ");

    let (program, terminal_args) = terminal_command(&command_line)?;
    tracing::info!(terminal = %program, command = %command_line, "opening terminal for re-authentication");

    std::process::Command::new(&program)
        .args(&terminal_args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| AdapterError::Reauth(format!("{}: {}", program, e)))
}

#[cfg(target_os = "macos")]
fn terminal_command(command_line: &str) -> Result<(String, Vec<String>), AdapterError> {
    let escaped = command_line.replace('\\', "\\\\").replace('"', "\\\"");
    Ok((
        "osascript".to_string(),
        vec![
            "-e".to_string(),
            format!("tell application \"Terminal\" to do script \"{}\"", escaped),
            "-e".to_string(),
            "tell application \"Terminal\" to activate".to_string(),
        ],
    ))
}

#[cfg(windows)]
fn terminal_command(command_line: &str) -> Result<(String, Vec<String>), AdapterError> {
    Ok((
        "cmd".to_string(),
        vec![
            "/c".to_string(),
            "start".to_string(),
            "\"\"".to_string(),
            "cmd".to_string(),
            "/k".to_string(),
            command_line.to_string(),
        ],
    ))
}

#[cfg(not(any(target_os = "macos", windows)))]
fn terminal_command(command_line: &str) -> Result<(String, Vec<String>), AdapterError> {
    const TERMINALS: &[&str] = &["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"];

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let terminal = TERMINALS
        .iter()
        .find(|name| super::resolver::CliResolver::new(**name, Vec::new()).find_in_path(&path_var).is_some())
        .ok_or_else(|| AdapterError::Reauth(format!("none of {} found on PATH", TERMINALS.join(", "))))?;

    // gnome-terminal dropped `-e` in favour of `--`.
    let flag = if *terminal == "gnome-terminal" { "--" } else { "-e" };
    Ok((
        terminal.to_string(),
        vec![
            flag.to_string(),
            "sh".to_string(),
            "-c".to_string(),
            format!("{}; exec \"${{SHELL:-sh}}\"", command_line),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(text: &str) -> ProbeOutput {
        ProbeOutput {
            exit_code: Some(1),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_auth_status() {
        assert_eq!(auth_status(None), AuthStatus::ok(), "timeouts assume OK");
        assert_eq!(auth_status(Some(&output("OK"))), AuthStatus::ok());

        let failed = auth_status(Some(&output("starting\nInvalid API key · Please run /login\n")));
        assert!(!failed.authenticated);
        assert_eq!(failed.message.as_deref(), Some("Invalid API key · Please run /login"));
    }

    #[test]
    fn test_usage_status() {
        assert!(!usage_status(None).is_usage_limit);
        assert!(usage_status(Some(&output("Claude usage limit reached"))).is_usage_limit);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/usr/bin/claude"), "/usr/bin/claude");
        assert_eq!(shell_quote("/Applications/My Tools/claude"), "'/Applications/My Tools/claude'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_collects_stdout_and_stderr() {
        let plan = ExecutionPlan::direct("/bin/sh");
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 2".to_string()];
        let out = run(&plan, &args, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.exit_code, Some(2));
        assert_eq!(out.text, "out\nerr\n");
        assert_eq!(version_line(&out).as_deref(), Some("out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_timeout_degrades_to_none() {
        let plan = ExecutionPlan::direct("/bin/sh");
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let started = std::time::Instant::now();
        assert!(run(&plan, &args, Duration::from_millis(200)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(5), "timeout must not wait for the process");
    }
}

//! Agent process launching and handles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use super::error::AdapterError;
use super::resolver::ExecutionPlan;

/// Variables forced on every agent process so it never waits for a TTY
pub const NON_INTERACTIVE_ENV: &[(&str, &str)] = &[("CI", "true"), ("TERM", "dumb"), ("NO_COLOR", "1")];

/// Windows caps the command line length, so prompts go through stdin there.
pub fn prompt_via_stdin() -> bool {
    cfg!(windows)
}

/// Everything needed to start one agent process
#[derive(Debug, Clone)]
pub struct Launch {
    pub plan: ExecutionPlan,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Written to stdin, which is then closed. Without it stdin is closed immediately.
    pub stdin: Option<String>,
}

impl Launch {
    pub fn new(plan: ExecutionPlan, args: Vec<String>) -> Self {
        Self {
            plan,
            args,
            cwd: None,
            env: HashMap::new(),
            stdin: None,
        }
    }

    /// Full argument vector, interpreter script first
    pub fn argv(&self) -> Vec<String> {
        self.plan
            .prepend_args
            .iter()
            .chain(self.args.iter())
            .cloned()
            .collect()
    }
}

/// A running agent process. Owned by one caller until `wait` consumes it.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    pid: Option<u32>,
    command: PathBuf,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// Start the process described by `launch`. Must be called inside a tokio runtime.
pub fn spawn(launch: Launch) -> Result<AgentProcess, AdapterError> {
    let argv = launch.argv();
    let mut command = Command::new(&launch.plan.command);
    command
        .args(&argv)
        .stdin(if launch.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(NON_INTERACTIVE_ENV.iter().copied())
        .envs(&launch.env)
        .kill_on_drop(true);
    if let Some(cwd) = &launch.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|source| AdapterError::Spawn {
        command: launch.plan.command.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::info!(
        command = %launch.plan.command.display(),
        pid = ?pid,
        args = argv.len(),
        "spawned agent process"
    );

    if let Some(payload) = launch.stdin {
        let mut stdin = child.stdin.take().ok_or(AdapterError::MissingPipe("stdin"))?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::warn!(error = %e, "failed to write prompt to agent stdin");
            }
            // Dropping the handle closes the pipe so the agent sees EOF.
            drop(stdin);
        });
    }

    let stdout = child.stdout.take().ok_or(AdapterError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(AdapterError::MissingPipe("stderr"))?;

    Ok(AgentProcess {
        child,
        pid,
        command: launch.plan.command,
        stdout: Some(stdout),
        stderr: Some(stderr),
    })
}

impl AgentProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &std::path::Path {
        &self.command
    }

    /// Take the stdout pipe; `None` once taken
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Ask the process to terminate. Returns whether a signal was delivered.
    pub fn kill(&mut self) -> bool {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
            let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if rc == 0 {
                tracing::debug!(pid, "sent SIGTERM to agent process");
                return true;
            }
        }

        match self.child.start_kill() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(pid = ?self.pid, error = %e, "kill failed, process already exited");
                false
            }
        }
    }

    /// Wait for exit and return the exit code. Signal deaths map to 128 + signal,
    /// a failed wait maps to -1. Consumes the handle.
    pub async fn wait(mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => exit_code(status),
            Err(e) => {
                tracing::warn!(pid = ?self.pid, error = %e, "waiting for agent process failed");
                -1
            }
        }
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn sh(script: &str) -> Launch {
        Launch::new(
            ExecutionPlan::direct("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn test_spawn_reads_stdout_and_exit_code() {
        let mut process = spawn(sh("echo hello; exit 3")).unwrap();
        let stdout = process.take_stdout().unwrap();
        let lines: Vec<String> = crate::agent::stream::lines(stdout).collect().await;
        assert_eq!(lines, vec!["hello"]);
        assert_eq!(process.wait().await, 3);
    }

    #[tokio::test]
    async fn test_stdin_payload_is_delivered_then_closed() {
        let mut launch = sh("cat");
        launch.stdin = Some("from stdin\n".to_string());
        let mut process = spawn(launch).unwrap();
        let stdout = process.take_stdout().unwrap();
        let lines: Vec<String> = crate::agent::stream::lines(stdout).collect().await;
        assert_eq!(lines, vec!["from stdin"]);
        assert_eq!(process.wait().await, 0);
    }

    #[tokio::test]
    async fn test_stdin_closed_without_payload() {
        let process = spawn(sh("cat; echo done")).unwrap();
        assert_eq!(process.wait().await, 0, "cat must see EOF immediately");
    }

    #[tokio::test]
    async fn test_forced_environment() {
        let mut process = spawn(sh("echo \"$CI $TERM\"")).unwrap();
        let stdout = process.take_stdout().unwrap();
        let lines: Vec<String> = crate::agent::stream::lines(stdout).collect().await;
        assert_eq!(lines, vec!["true dumb"]);
        process.wait().await;
    }

    #[tokio::test]
    async fn test_kill_resolves_wait() {
        let mut process = spawn(sh("sleep 30")).unwrap();
        assert!(process.kill());
        assert_eq!(process.wait().await, 128 + libc::SIGTERM);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let launch = Launch::new(ExecutionPlan::direct("/definitely/not/here"), vec![]);
        let err = spawn(launch).unwrap_err();
        assert!(matches!(err, AdapterError::Spawn { .. }));
    }
}

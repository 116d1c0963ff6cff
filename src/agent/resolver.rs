//! Agent executable discovery.
//!
//! GUI launches and service managers rarely inherit the PATH a user's shell
//! profile builds, so discovery falls through three strategies: the process
//! PATH, the PATH reported by a login shell, and a list of well-known install
//! locations (including Node version-manager directories).

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

const LOGIN_SHELL_TIMEOUT: Duration = Duration::from_secs(5);
const PATH_START: &str = "__TASKRAIL_PATH_START__";
const PATH_END: &str = "__TASKRAIL_PATH_END__";

/// Script extensions that need an explicit interpreter
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs"];

/// Directory names that indicate a Node version manager install
const VERSION_MANAGER_DIRS: &[&str] = &[".nvm", ".fnm", "fnm", ".volta", ".asdf", ".nodenv", "nvs", ".n"];

#[cfg(windows)]
const NODE_BINARY: &str = "node.exe";
#[cfg(not(windows))]
const NODE_BINARY: &str = "node";

/// How to actually launch a resolved executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub command: PathBuf,
    /// Arguments placed before the caller's arguments (the script path, when
    /// the executable has to go through an interpreter)
    pub prepend_args: Vec<String>,
}

impl ExecutionPlan {
    pub fn direct(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            prepend_args: Vec::new(),
        }
    }
}

/// Locates one agent executable
#[derive(Debug, Clone)]
pub struct CliResolver {
    binary: String,
    /// Patterns relative to the home directory (`~/...`) or absolute; may contain globs
    known_locations: Vec<String>,
}

impl CliResolver {
    pub fn new(binary: impl Into<String>, known_locations: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            known_locations,
        }
    }

    /// Resolver for the `claude` CLI with its usual install locations
    pub fn claude() -> Self {
        Self::new("claude", node_cli_locations("claude", &["~/.claude/local/claude"]))
    }

    /// Resolver for the `codex` CLI
    pub fn codex() -> Self {
        Self::new("codex", node_cli_locations("codex", &["~/.cargo/bin/codex"]))
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// PATH, then login-shell PATH, then known locations. `None` when the CLI
    /// is not installed; that is an expected condition, not an error.
    pub async fn resolve(&self) -> Option<PathBuf> {
        if let Some(path_var) = std::env::var_os("PATH") {
            if let Some(found) = self.find_in_path(&path_var) {
                tracing::debug!(binary = %self.binary, path = %found.display(), "found on PATH");
                return Some(found);
            }
        }

        if let Some(shell_path) = login_shell_path().await {
            if let Some(found) = self.find_in_path(&shell_path) {
                tracing::debug!(binary = %self.binary, path = %found.display(), "found on login shell PATH");
                return Some(found);
            }
        }

        let home = dirs::home_dir()?;
        let found = self.find_in_known_locations(&home);
        match &found {
            Some(path) => {
                tracing::debug!(binary = %self.binary, path = %path.display(), "found in known location")
            }
            None => tracing::debug!(binary = %self.binary, "executable not found"),
        }
        found
    }

    /// Look the binary up in a PATH-style variable
    pub fn find_in_path(&self, path_var: &OsStr) -> Option<PathBuf> {
        std::env::split_paths(path_var)
            .filter(|dir| !dir.as_os_str().is_empty())
            .find_map(|dir| {
                executable_names(&self.binary)
                    .into_iter()
                    .map(|name| dir.join(name))
                    .find(|candidate| is_executable(candidate))
            })
    }

    /// Check the known locations in order; glob patterns that match several
    /// paths take the greatest path string as the latest install.
    pub fn find_in_known_locations(&self, home: &Path) -> Option<PathBuf> {
        self.known_locations.iter().find_map(|pattern| {
            let expanded = expand_home(pattern, home);
            if pattern.contains('*') {
                let mut matches: Vec<PathBuf> = glob::glob(&expanded.to_string_lossy())
                    .ok()?
                    .filter_map(Result::ok)
                    .filter(|p| is_executable(p))
                    .collect();
                matches.sort_by(|a, b| b.cmp(a));
                matches.into_iter().next()
            } else if is_executable(&expanded) {
                Some(expanded)
            } else {
                None
            }
        })
    }
}

/// Common install locations for an npm-distributed CLI, per platform
fn node_cli_locations(binary: &str, extra: &[&str]) -> Vec<String> {
    let mut locations: Vec<String> = extra.iter().map(|s| s.to_string()).collect();

    if cfg!(windows) {
        locations.extend([
            format!("~/AppData/Roaming/npm/{binary}.cmd"),
            format!("~/AppData/Roaming/npm/{binary}.exe"),
            format!("~/.local/bin/{binary}.exe"),
            format!("~/scoop/shims/{binary}.exe"),
        ]);
        return locations;
    }

    if cfg!(target_os = "macos") {
        locations.extend([
            format!("/opt/homebrew/bin/{binary}"),
            format!("/usr/local/bin/{binary}"),
        ]);
    } else {
        locations.extend([
            format!("/usr/local/bin/{binary}"),
            format!("/usr/bin/{binary}"),
            format!("/snap/bin/{binary}"),
        ]);
    }

    locations.extend([
        format!("~/.local/bin/{binary}"),
        format!("~/.npm-global/bin/{binary}"),
        format!("~/.npm/bin/{binary}"),
        format!("~/.bun/bin/{binary}"),
        format!("~/.volta/bin/{binary}"),
        format!("~/.yarn/bin/{binary}"),
        format!("~/.nvm/versions/node/*/bin/{binary}"),
        format!("~/.fnm/node-versions/*/installation/bin/{binary}"),
        format!("~/.local/share/fnm/node-versions/*/installation/bin/{binary}"),
        format!("~/.asdf/installs/nodejs/*/bin/{binary}"),
        format!("~/.nodenv/versions/*/bin/{binary}"),
    ]);
    locations
}

fn expand_home(pattern: &str, home: &Path) -> PathBuf {
    match pattern.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(pattern),
    }
}

fn executable_names(binary: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![
            format!("{binary}.exe"),
            format!("{binary}.cmd"),
            format!("{binary}.bat"),
            binary.to_string(),
        ]
    } else {
        vec![binary.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// PATH as seen by the user's interactive login shell
#[cfg(unix)]
async fn login_shell_path() -> Option<OsString> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| {
        if cfg!(target_os = "macos") {
            "/bin/zsh".to_string()
        } else {
            "/bin/bash".to_string()
        }
    });
    let script = format!("printf '{PATH_START}%s{PATH_END}' \"$PATH\"");

    let output = Command::new(&shell)
        .args(["-ilc", &script])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(LOGIN_SHELL_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::debug!(shell = %shell, error = %e, "login shell lookup failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(shell = %shell, "login shell lookup timed out");
            return None;
        }
    };

    extract_marked_path(&String::from_utf8_lossy(&output.stdout)).map(OsString::from)
}

#[cfg(not(unix))]
async fn login_shell_path() -> Option<OsString> {
    None
}

/// Profile scripts may print banners; the PATH sits between the markers.
fn extract_marked_path(stdout: &str) -> Option<String> {
    let start = stdout.find(PATH_START)? + PATH_START.len();
    let end = start + stdout[start..].find(PATH_END)?;
    let path = stdout[start..end].trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// Decide how to launch `path`. Scripts installed by a Node version manager
/// are not reliably runnable through their shebang (the manager's `node` is
/// not on a non-interactive PATH), so they are run through a sibling
/// interpreter when one can be found.
pub fn resolve_execution(path: &Path) -> ExecutionPlan {
    let target = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !is_managed_script(&target) {
        return ExecutionPlan::direct(path);
    }

    match find_interpreter(&target) {
        Some(node) => {
            tracing::debug!(
                script = %target.display(),
                interpreter = %node.display(),
                "running script through interpreter"
            );
            ExecutionPlan {
                command: node,
                prepend_args: vec![target.to_string_lossy().into_owned()],
            }
        }
        None => ExecutionPlan::direct(path),
    }
}

fn is_managed_script(path: &Path) -> bool {
    let is_script = path
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));
    let under_manager = path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| VERSION_MANAGER_DIRS.contains(&name))
    });
    is_script && under_manager
}

/// Library-relative (`<prefix>/lib/node_modules/...` → `<prefix>/bin/node`),
/// same directory, then any ancestor that looks like a manager's version root.
fn find_interpreter(script: &Path) -> Option<PathBuf> {
    let library_relative = script
        .ancestors()
        .find(|dir| {
            dir.file_name() == Some(OsStr::new("node_modules"))
                && dir.parent().and_then(Path::file_name) == Some(OsStr::new("lib"))
        })
        .and_then(|node_modules| node_modules.parent()?.parent())
        .map(|prefix| prefix.join("bin").join(NODE_BINARY));

    let same_dir = script.parent().map(|dir| dir.join(NODE_BINARY));

    let candidates = library_relative.into_iter().chain(same_dir);
    if let Some(found) = candidates.into_iter().find(|p| is_executable(p)) {
        return Some(found);
    }

    script.ancestors().skip(1).find_map(|dir| {
        [
            dir.join("bin").join(NODE_BINARY),
            dir.join("installation").join("bin").join(NODE_BINARY),
        ]
        .into_iter()
        .find(|p| is_executable(p))
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn touch_executable(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_find_in_path() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        touch_executable(&bin.join("claude"));
        std::fs::write(dir.path().join("claude"), "not executable").unwrap();

        let resolver = CliResolver::new("claude", vec![]);
        let path_var = std::env::join_paths([dir.path(), bin.as_path()]).unwrap();
        assert_eq!(resolver.find_in_path(&path_var), Some(bin.join("claude")));
        assert_eq!(resolver.find_in_path(OsStr::new("")), None);
    }

    #[test]
    fn test_known_locations_pick_latest_glob_match() {
        let home = TempDir::new().unwrap();
        for version in ["v18.0.0", "v20.1.0", "v19.2.0"] {
            touch_executable(&home.path().join(format!(".nvm/versions/node/{version}/bin/claude")));
        }

        let resolver = CliResolver::new(
            "claude",
            vec![
                "~/.missing/claude".to_string(),
                "~/.nvm/versions/node/*/bin/claude".to_string(),
            ],
        );
        assert_eq!(
            resolver.find_in_known_locations(home.path()),
            Some(home.path().join(".nvm/versions/node/v20.1.0/bin/claude"))
        );
    }

    #[test]
    fn test_known_locations_in_order() {
        let home = TempDir::new().unwrap();
        touch_executable(&home.path().join(".local/bin/codex"));
        touch_executable(&home.path().join(".bun/bin/codex"));

        let resolver = CliResolver::new(
            "codex",
            vec!["~/.local/bin/codex".to_string(), "~/.bun/bin/codex".to_string()],
        );
        assert_eq!(
            resolver.find_in_known_locations(home.path()),
            Some(home.path().join(".local/bin/codex"))
        );
    }

    #[test]
    fn test_resolve_execution_library_relative() {
        let root = TempDir::new().unwrap();
        let version_root = root.path().join(".nvm/versions/node/v20.1.0");
        let script = version_root.join("lib/node_modules/@anthropic-ai/claude-code/cli.js");
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/usr/bin/env node\n").unwrap();
        touch_executable(&version_root.join("bin/node"));

        let plan = resolve_execution(&script);
        let canonical_root = std::fs::canonicalize(&version_root).unwrap();
        assert_eq!(plan.command, canonical_root.join("bin/node"));
        assert_eq!(
            plan.prepend_args,
            vec![std::fs::canonicalize(&script).unwrap().to_string_lossy().into_owned()]
        );
    }

    #[test]
    fn test_resolve_execution_same_directory() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(".volta/tools/image/node/20.0.0");
        let script = dir.join("cli.mjs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&script, "").unwrap();
        touch_executable(&dir.join("node"));

        let plan = resolve_execution(&script);
        assert_eq!(plan.command, std::fs::canonicalize(&dir).unwrap().join("node"));
    }

    #[test]
    fn test_resolve_execution_plain_binary() {
        let root = TempDir::new().unwrap();
        let binary = root.path().join("claude");
        touch_executable(&binary);
        assert_eq!(resolve_execution(&binary), ExecutionPlan::direct(&binary));
    }

    #[test]
    fn test_script_outside_version_manager_is_direct() {
        let root = TempDir::new().unwrap();
        let script = root.path().join("lib/node_modules/pkg/cli.js");
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "").unwrap();
        touch_executable(&root.path().join("bin/node"));
        assert_eq!(resolve_execution(&script), ExecutionPlan::direct(&script));
    }

    #[test]
    fn test_extract_marked_path() {
        let stdout = format!("Welcome!\n{PATH_START}/usr/bin:/bin{PATH_END}");
        assert_eq!(extract_marked_path(&stdout), Some("/usr/bin:/bin".to_string()));
        assert_eq!(extract_marked_path("no markers"), None);
    }
}

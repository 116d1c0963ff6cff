use super::*;
use std::path::PathBuf;

use crate::agent::error::AdapterError;

fn options() -> InvokeOptions {
    InvokeOptions {
        model: Some("claude-opus-4-1-20250805".to_string()),
        conversation_id: Some("sess-1".to_string()),
        extra_dirs: vec![PathBuf::from("/tmp/docs")],
        ..Default::default()
    }
}

#[test]
fn test_invocation_flags() {
    let adapter = ClaudeAdapter::new();
    let invocation = adapter.build_invocation("fix it", &options());
    let args = &invocation.args;

    for flag in ["--print", "--verbose", "--dangerously-skip-permissions"] {
        assert!(args.iter().any(|a| a == flag), "missing {}", flag);
    }
    let format = args.iter().position(|a| a == "--output-format").expect("output format flag");
    assert_eq!(args[format + 1], "stream-json");
    let resume = args.iter().position(|a| a == "--resume").expect("resume flag");
    assert_eq!(args[resume + 1], "sess-1");
    let model = args.iter().position(|a| a == "--model").expect("model flag");
    assert_eq!(args[model + 1], "claude-opus-4-1-20250805");
    let add_dir = args.iter().position(|a| a == "--add-dir").expect("add-dir flag");
    assert_eq!(args[add_dir + 1], "/tmp/docs");
    assert!(
        !args.iter().any(|a| a == "--include-partial-messages"),
        "one-shot runs do not stream partial messages"
    );
}

#[cfg(not(windows))]
#[test]
fn test_prompt_is_last_argument_after_end_of_options() {
    let adapter = ClaudeAdapter::new();
    let invocation = adapter.build_invocation("fix it", &options());
    let n = invocation.args.len();
    assert_eq!(invocation.args[n - 2], "--");
    assert_eq!(invocation.args[n - 1], "fix it");
    assert_eq!(invocation.stdin, None);
}

#[test]
fn test_minimal_invocation_has_no_optional_flags() {
    let adapter = ClaudeAdapter::new();
    let invocation = adapter.build_invocation("hello", &InvokeOptions::default());
    for flag in ["--resume", "--model", "--add-dir"] {
        assert!(!invocation.args.iter().any(|a| a == flag), "unexpected {}", flag);
    }
}

#[test]
fn test_chat_streams_partial_messages() {
    let adapter = ClaudeAdapter::new();
    let invocation = adapter.build_chat_invocation("hi", &InvokeOptions::default());
    assert!(invocation.args.iter().any(|a| a == "--include-partial-messages"));
}

#[test]
fn test_invoke_before_resolution_fails_fast() {
    let adapter = ClaudeAdapter::new();
    let err = adapter.invoke("hello", &InvokeOptions::default()).unwrap_err();
    assert!(
        matches!(err, AdapterError::NotResolved { ref agent } if agent == "claude"),
        "got {:?}",
        err
    );
    assert!(adapter.trigger_reauth().is_err());
}

#[test]
fn test_models_resolve_aliases() {
    let adapter = ClaudeAdapter::new();
    let models = adapter.models();
    assert_eq!(models.resolve("opus"), "claude-opus-4-1-20250805");
    assert_eq!(models.default_model(), Some("claude-sonnet-4-5-20250929"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_custom_path_resolution_and_invalidation() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::TempDir::new().unwrap();
    let fake = dir.path().join("claude");
    std::fs::write(&fake, "#!/bin/sh\necho \"$@\"\n").unwrap();
    std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

    let adapter = ClaudeAdapter::new();
    adapter.set_custom_path(Some(fake.clone()));
    assert_eq!(adapter.resolve_executable().await, Some(fake.clone()));
    assert_eq!(adapter.resolved_path(), Some(fake));

    adapter.set_custom_path(None);
    assert_eq!(adapter.resolved_path(), None, "setting a path clears the cache");
}

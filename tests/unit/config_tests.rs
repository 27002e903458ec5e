//! Unit tests for `BridgeConfig` parsing, defaults and validation.

use std::io::Write;
use std::path::PathBuf;

use farside::config::{BridgeConfig, DEFAULT_ENV_ALLOWLIST, EXECUTOR_BIN};
use farside::BridgeError;

/// An empty document yields the defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = BridgeConfig::from_toml_str("").expect("empty config must parse");
    assert_eq!(config, BridgeConfig::default());
    assert_eq!(config.max_line_bytes, 1_048_576);
    assert_eq!(config.max_call_depth, 1000);
    assert!(config.executor.is_none());
    assert!(config.executor_args.is_empty());
    assert_eq!(config.env_allowlist.len(), DEFAULT_ENV_ALLOWLIST.len());
    assert!(config.env_allowlist.iter().any(|key| key == "PATH"));
}

/// Every field can be set from TOML.
#[test]
fn full_toml_parses() {
    let config = BridgeConfig::from_toml_str(
        r#"
executor = "/opt/farside/bin/farside-executor"
executor_args = ["--log-format", "json"]
max_line_bytes = 4096
max_call_depth = 64
env_allowlist = ["PATH"]
"#,
    )
    .expect("config must parse");

    assert_eq!(
        config.executor,
        Some(PathBuf::from("/opt/farside/bin/farside-executor"))
    );
    assert_eq!(config.executor_args, vec!["--log-format", "json"]);
    assert_eq!(config.max_line_bytes, 4096);
    assert_eq!(config.max_call_depth, 64);
    assert_eq!(config.env_allowlist, vec!["PATH"]);
}

/// Zero limits are rejected.
#[test]
fn zero_limits_are_rejected() {
    let err = BridgeConfig::from_toml_str("max_line_bytes = 0").expect_err("zero line limit must fail");
    assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("max_line_bytes")));

    let err = BridgeConfig::from_toml_str("max_call_depth = 0").expect_err("zero depth must fail");
    assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("max_call_depth")));
}

/// An empty executor path is rejected.
#[test]
fn empty_executor_is_rejected() {
    let err = BridgeConfig::from_toml_str(r#"executor = """#).expect_err("empty executor must fail");
    assert!(matches!(err, BridgeError::Config(_)));
}

/// Malformed TOML maps to a config error.
#[test]
fn invalid_toml_is_a_config_error() {
    let err = BridgeConfig::from_toml_str("max_line_bytes = [").expect_err("bad toml must fail");
    assert!(err.to_string().starts_with("config:"), "got {err}");
}

/// Configuration loads from a file on disk.
#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file must be created");
    writeln!(file, "max_call_depth = 12").expect("write must succeed");

    let config = BridgeConfig::load_from_path(file.path()).expect("config must load");
    assert_eq!(config.max_call_depth, 12);
}

/// A missing file is a config error, not a panic.
#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("temp dir must be created");
    let err = BridgeConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file must fail");
    assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("failed to read config")));
}

/// Generated limits come before user arguments.
#[test]
fn command_args_carry_limits() {
    let config = BridgeConfig {
        executor_args: vec!["--log-format".into(), "json".into()],
        max_call_depth: 50,
        max_line_bytes: 2048,
        ..BridgeConfig::default()
    };
    assert_eq!(
        config.executor_command_args(),
        vec![
            "--max-call-depth",
            "50",
            "--max-line-bytes",
            "2048",
            "--log-format",
            "json"
        ]
    );
}

/// An explicit executor wins; otherwise the bundled binary name is used.
#[test]
fn resolve_executor_prefers_explicit_path() {
    let explicit = BridgeConfig::with_executor("/usr/local/bin/custom");
    assert_eq!(explicit.resolve_executor(), PathBuf::from("/usr/local/bin/custom"));

    let resolved = BridgeConfig::default().resolve_executor();
    let name = resolved
        .file_name()
        .and_then(|n| n.to_str())
        .expect("resolved executor must have a file name");
    assert!(name.starts_with(EXECUTOR_BIN), "got {name}");
}

//! Bridge configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::protocol::codec::MAX_LINE_BYTES;
use crate::{BridgeError, Result};

/// Executor binary name looked up next to the current executable, then on `PATH`.
pub const EXECUTOR_BIN: &str = "farside-executor";

/// Environment variables inherited by the executor process by default.
///
/// Every other variable from the host environment is stripped via
/// `env_clear()` before the child is launched.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
];

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_max_call_depth() -> usize {
    1000
}

fn default_env_allowlist() -> Vec<String> {
    DEFAULT_ENV_ALLOWLIST
        .iter()
        .map(|&key| key.to_owned())
        .collect()
}

/// Bridge configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Executor binary. Resolved with [`BridgeConfig::resolve_executor`] when unset.
    #[serde(default)]
    pub executor: Option<PathBuf>,
    /// Extra arguments passed to the executor after the generated ones.
    #[serde(default)]
    pub executor_args: Vec<String>,
    /// Longest line either side of the bridge accepts.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Recursion limit for the executor's runtime.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Environment variables the executor inherits.
    #[serde(default = "default_env_allowlist")]
    pub env_allowlist: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            executor: None,
            executor_args: Vec::new(),
            max_line_bytes: default_max_line_bytes(),
            max_call_depth: default_max_call_depth(),
            env_allowlist: default_env_allowlist(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| BridgeError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration that runs the given executor binary with defaults otherwise.
    #[must_use]
    pub fn with_executor(executor: impl Into<PathBuf>) -> Self {
        Self {
            executor: Some(executor.into()),
            ..Self::default()
        }
    }

    /// Check limits and paths.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_line_bytes == 0 {
            return Err(BridgeError::Config(
                "max_line_bytes must be greater than zero".into(),
            ));
        }

        if self.max_call_depth == 0 {
            return Err(BridgeError::Config(
                "max_call_depth must be greater than zero".into(),
            ));
        }

        if self
            .executor
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(BridgeError::Config("executor must not be empty".into()));
        }

        Ok(())
    }

    /// The executor binary to launch.
    ///
    /// Uses `executor` when set, then a `farside-executor` sitting next to the
    /// current executable, then falls back to a bare name for `PATH` lookup.
    #[must_use]
    pub fn resolve_executor(&self) -> PathBuf {
        if let Some(path) = &self.executor {
            return path.clone();
        }

        let file_name = format!("{EXECUTOR_BIN}{}", std::env::consts::EXE_SUFFIX);
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
            .filter(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }

    /// Full argument list for the executor process.
    #[must_use]
    pub fn executor_command_args(&self) -> Vec<String> {
        let mut args = vec![
            "--max-call-depth".to_owned(),
            self.max_call_depth.to_string(),
            "--max-line-bytes".to_owned(),
            self.max_line_bytes.to_string(),
        ];
        args.extend(self.executor_args.iter().cloned());
        args
    }
}

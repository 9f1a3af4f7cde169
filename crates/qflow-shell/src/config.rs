//! Interpreter session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable overriding [`ShellConfig::interpreter`].
pub const ENV_INTERPRETER: &str = "QFLOW_PYTHON";

/// Environment variable overriding [`ShellConfig::execute_timeout_ms`].
/// `0` disables the timeout.
pub const ENV_EXECUTE_TIMEOUT_MS: &str = "QFLOW_EXECUTE_TIMEOUT_MS";

/// Configuration for an interpreter session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter executable. A bare name is looked up on `PATH`.
    pub interpreter: PathBuf,

    /// Arguments passed to the interpreter. The defaults request
    /// unbuffered streams and interactive mode.
    pub args: Vec<String>,

    /// Upper bound on a single `execute()` call, in milliseconds.
    pub execute_timeout_ms: Option<u64>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            args: vec!["-u".to_string(), "-i".to_string()],
            execute_timeout_ms: Some(120_000),
        }
    }
}

impl ShellConfig {
    /// Create a configuration for the given interpreter path.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            ..Self::default()
        }
    }

    /// Set the execute timeout. `None` waits forever.
    pub fn with_execute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execute_timeout_ms = timeout.map(|d| d.as_millis() as u64);
        self
    }

    /// Execute timeout as a [`Duration`].
    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_ms.map(Duration::from_millis)
    }

    /// Apply `QFLOW_*` overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_INTERPRETER).filter(|p| !p.trim().is_empty()) {
            self.interpreter = PathBuf::from(path.trim());
        }

        if let Some(raw) = lookup(ENV_EXECUTE_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.execute_timeout_ms = None,
                Ok(ms) => self.execute_timeout_ms = Some(ms),
                Err(e) => warn!("Ignoring {ENV_EXECUTE_TIMEOUT_MS}={raw:?}: {e}"),
            }
        }

        self
    }
}

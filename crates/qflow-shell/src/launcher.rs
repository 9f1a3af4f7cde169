//! Launching the interpreter process.
//!
//! The session never spawns processes itself; it asks a [`Launcher`] for a
//! set of pipes. [`ProcessLauncher`] spawns a real executable, while
//! [`crate::mock::MockInterpreter`] serves an in-process fake for tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};

/// Boxed writer for the interpreter's standard input.
pub type StdinPipe = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed reader for one of the interpreter's output channels.
pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// Whatever keeps the interpreter alive.
pub enum ProcessHandle {
    /// An OS process.
    Child(Child),
    /// An in-process task (mock interpreters).
    Task(JoinHandle<()>),
}

impl ProcessHandle {
    /// Terminate the interpreter. Errors are logged, not returned.
    pub async fn terminate(self) {
        match self {
            ProcessHandle::Child(mut child) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill interpreter process: {}", e);
                }
            }
            ProcessHandle::Task(task) => task.abort(),
        }
    }
}

/// A freshly launched interpreter.
pub struct Launched {
    pub stdin: StdinPipe,
    pub stdout: OutputPipe,
    pub stderr: OutputPipe,
    pub handle: ProcessHandle,
}

/// Produces interpreter processes for a session.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Start a new interpreter.
    async fn launch(&self) -> ShellResult<Launched>;
}

/// Spawns the executable named in a [`ShellConfig`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Create a launcher from configuration.
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            program: config.interpreter.clone(),
            args: config.args.clone(),
        }
    }

    /// Resolve the configured program to an existing file.
    ///
    /// Paths with more than one component are taken as-is; bare names are
    /// searched on `PATH`.
    pub fn resolve(&self) -> ShellResult<PathBuf> {
        resolve_program(&self.program, std::env::var_os("PATH"))
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    fn describe(&self) -> String {
        format!("{} {}", self.program.display(), self.args.join(" "))
    }

    async fn launch(&self) -> ShellResult<Launched> {
        let program = self.resolve()?;
        debug!("Spawning interpreter {}", program.display());

        let mut child = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(ShellError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ShellError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ShellError::MissingPipe("stderr"))?;

        Ok(Launched {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: ProcessHandle::Child(child),
        })
    }
}

fn resolve_program(
    program: &Path,
    search_path: Option<std::ffi::OsString>,
) -> ShellResult<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return if program.is_file() {
            Ok(program.to_path_buf())
        } else {
            Err(ShellError::ExecutableNotFound(program.to_path_buf()))
        };
    }

    let dirs: Vec<PathBuf> = search_path
        .as_deref()
        .map(|raw| std::env::split_paths(raw).collect())
        .unwrap_or_default();

    dirs.into_iter()
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ShellError::ExecutableNotFound(program.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_absolute_path() {
        let err = resolve_program(Path::new("/definitely/not/here/python"), None).unwrap_err();
        assert!(matches!(err, ShellError::ExecutableNotFound(p) if p.ends_with("python")));
    }

    #[test]
    fn test_bare_name_without_search_path() {
        let err = resolve_program(Path::new("python3"), None).unwrap_err();
        assert!(matches!(err, ShellError::ExecutableNotFound(_)));
    }

    #[test]
    fn test_bare_name_found_on_search_path() {
        let dir = std::env::temp_dir().join(format!("qflow-launcher-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fake = dir.join("fakepython");
        std::fs::write(&fake, b"").unwrap();

        let search = std::env::join_paths([Path::new("/nonexistent-dir"), dir.as_path()]).unwrap();
        let resolved = resolve_program(Path::new("fakepython"), Some(search)).unwrap();
        assert_eq!(resolved, fake);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let launcher = ProcessLauncher::new(&ShellConfig::new("/no/such/interpreter"));
        assert!(matches!(
            launcher.launch().await,
            Err(ShellError::ExecutableNotFound(_))
        ));
    }
}

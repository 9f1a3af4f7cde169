//! qflow interpreter session
//!
//! Drives one persistent, interactive interpreter process (Python by
//! default) and turns its streaming REPL output back into per-command
//! results.
//!
//! # Overview
//!
//! An interactive interpreter has no request/response framing: output just
//! streams out of two pipes. After every command the session injects two
//! marker statements, one printing on stdout and one on stderr, and treats
//! "both markers observed" as completion. See [`boundary`] for the exact
//! framing.
//!
//! - [`InterpreterSession`] serializes commands and owns the process.
//! - [`Launcher`] is the seam for producing processes; [`ProcessLauncher`]
//!   spawns a real executable.
//! - [`mock::MockInterpreter`] fakes the interpreter in-process for tests.
//!
//! # Example
//!
//! ```ignore
//! use qflow_shell::{InterpreterSession, ShellConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = InterpreterSession::new(ShellConfig::default());
//!     session.start().await?;
//!
//!     let out = session.execute("x = 1+1\nx").await?;
//!     assert_eq!(out, "2");
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

pub mod boundary;
pub mod config;
pub mod error;
pub mod launcher;
pub mod mock;
pub mod session;

pub use boundary::{STDERR_SENTINEL, STDOUT_SENTINEL};
pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
pub use launcher::{Launched, Launcher, ProcessHandle, ProcessLauncher};
pub use session::InterpreterSession;

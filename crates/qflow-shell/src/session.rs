//! The persistent interpreter session.
//!
//! # Lifecycle
//!
//! ```text
//!   start() ──→ execute()* ──→ stop()
//!      │            │
//!      │            ├──→ Interpreter error (session stays up)
//!      │            └──→ hung / exited / IO error ──→ forced stop()
//!      └──→ ExecutableNotFound / Spawn
//! ```
//!
//! All operations take the same async mutex, so at most one command is in
//! flight: a second `execute()` is not written to the interpreter until the
//! first one has observed both of its boundary markers. When an `execute()`
//! future is dropped before that point, the next command first drains the
//! abandoned command's boundary so outputs never shift by one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::boundary::{Boundary, BoundaryCollector, StreamLine, frame_command};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::launcher::{Launched, Launcher, OutputPipe, ProcessHandle, ProcessLauncher, StdinPipe};

/// A long-lived interpreter process fed with script fragments.
pub struct InterpreterSession {
    config: ShellConfig,
    launcher: Arc<dyn Launcher>,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    process: Option<RunningProcess>,
    /// Every command submitted since `start()`, in order.
    script: String,
    last_command: String,
}

impl InterpreterSession {
    /// Create a session that spawns the interpreter named in `config`.
    pub fn new(config: ShellConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::new(&config));
        Self::with_launcher(config, launcher)
    }

    /// Create a session backed by a custom launcher.
    pub fn with_launcher(config: ShellConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// A new, stopped session sharing this one's configuration and launcher.
    pub fn sibling(&self) -> Self {
        Self::with_launcher(self.config.clone(), Arc::clone(&self.launcher))
    }

    /// Whether an interpreter process is running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.process.is_some()
    }

    /// All commands submitted since the last `start()`.
    pub async fn script(&self) -> String {
        self.state.lock().await.script.clone()
    }

    /// The most recently submitted command.
    pub async fn last_command(&self) -> String {
        self.state.lock().await.last_command.clone()
    }

    /// Spawn the interpreter if it is not already running.
    ///
    /// Returns the interpreter banner for a fresh process and `None` when a
    /// process was already running.
    #[instrument(skip(self))]
    pub async fn start(&self) -> ShellResult<Option<String>> {
        let mut state = self.state.lock().await;
        if state.process.is_some() {
            debug!("Interpreter already running");
            return Ok(None);
        }

        let launched = self.launcher.launch().await?;
        state.process = Some(RunningProcess::attach(launched));
        info!("Started interpreter: {}", self.launcher.describe());

        // The no-op round trip waits for the interpreter to come up. Its
        // banner arrives on the error channel, so that is not a failure.
        match self.run_locked(&mut state, "").await {
            Ok(banner) | Err(ShellError::Interpreter(banner)) => Ok(Some(banner)),
            Err(e) => Err(e),
        }
    }

    /// Run `command` and return its standard output.
    ///
    /// Fails with [`ShellError::Interpreter`] when the command wrote to the
    /// error channel; the session remains usable in that case.
    #[instrument(skip(self, command), fields(bytes = command.len()))]
    pub async fn execute(&self, command: &str) -> ShellResult<String> {
        let mut state = self.state.lock().await;
        if state.process.is_none() {
            return Err(ShellError::ProcessNotStarted);
        }

        state.last_command = command.to_string();
        state.script.push('\n');
        state.script.push_str(command);
        state.script.push('\n');

        self.run_locked(&mut state, command).await
    }

    /// Terminate the interpreter and forget the accumulated script.
    /// A no-op when nothing is running.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.process.is_none() {
            return;
        }
        Self::shutdown_locked(&mut state).await;
        info!("Stopped interpreter");
    }

    /// `stop()` followed by `start()`.
    pub async fn restart(&self) -> ShellResult<Option<String>> {
        self.stop().await;
        self.start().await
    }

    async fn run_locked(&self, state: &mut SessionState, command: &str) -> ShellResult<String> {
        let process = state
            .process
            .as_mut()
            .ok_or(ShellError::ProcessNotStarted)?;

        let timeout = self.config.execute_timeout();
        let outcome = match process.settle(timeout).await {
            Ok(()) => process.run(command, timeout).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => debug!("Command failed in interpreter: {}", e),
            Err(e) => {
                warn!("Stopping interpreter after fatal error: {}", e);
                Self::shutdown_locked(state).await;
            }
        }

        outcome
    }

    async fn shutdown_locked(state: &mut SessionState) {
        if let Some(process) = state.process.take() {
            process.shutdown().await;
        }
        state.script.clear();
        state.last_command.clear();
    }
}

/// Pipes and reader tasks of a live interpreter.
struct RunningProcess {
    stdin: StdinPipe,
    lines: mpsc::UnboundedReceiver<StreamLine>,
    /// Lines that arrived after a previous command's boundary.
    backlog: VecDeque<StreamLine>,
    /// Progress of the current exchange. Survives a dropped `execute()`.
    phase: Phase,
    readers: [JoinHandle<()>; 2],
    handle: ProcessHandle,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    /// The framed command may be only partly written.
    Writing,
    /// The command is written; its boundary has not been seen yet.
    Collecting(BoundaryCollector),
}

impl RunningProcess {
    fn attach(launched: Launched) -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        let readers = [
            spawn_reader(launched.stdout, tx.clone(), StreamLine::Stdout),
            spawn_reader(launched.stderr, tx, StreamLine::Stderr),
        ];

        Self {
            stdin: launched.stdin,
            lines,
            backlog: VecDeque::new(),
            phase: Phase::Idle,
            readers,
            handle: launched.handle,
        }
    }

    /// Finish whatever a cancelled `execute()` left behind.
    ///
    /// A command that was fully written has its output drained and
    /// discarded. A half-written command leaves the interpreter in an
    /// unknown state and fails with [`ShellError::Interrupted`].
    async fn settle(&mut self, timeout: Option<Duration>) -> ShellResult<()> {
        match self.phase {
            Phase::Idle => Ok(()),
            Phase::Writing => Err(ShellError::Interrupted),
            Phase::Collecting(_) => {
                warn!("Discarding output of a cancelled command");
                let drained = self.collect();
                match timeout {
                    Some(limit) => {
                        tokio::time::timeout(limit, drained)
                            .await
                            .map_err(|_| ShellError::ProcessHung(limit))??;
                    }
                    None => {
                        drained.await?;
                    }
                }
                Ok(())
            }
        }
    }

    async fn run(&mut self, command: &str, timeout: Option<Duration>) -> ShellResult<String> {
        let exchange = self.exchange(command);
        let boundary = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ShellError::ProcessHung(limit))??,
            None => exchange.await?,
        };
        boundary.into_output()
    }

    async fn exchange(&mut self, command: &str) -> ShellResult<Boundary> {
        self.phase = Phase::Writing;
        self.stdin.write_all(frame_command(command).as_bytes()).await?;
        self.stdin.flush().await?;
        self.phase = Phase::Collecting(BoundaryCollector::default());
        self.collect().await
    }

    /// Read lines until the pending command's boundary is complete.
    ///
    /// Lines stay in the collector held by `phase` across awaits, so
    /// dropping this future loses nothing.
    async fn collect(&mut self) -> ShellResult<Boundary> {
        let Phase::Collecting(collector) = &mut self.phase else {
            return Err(ShellError::Interrupted);
        };
        while !collector.is_complete() {
            let line = match self.backlog.pop_front() {
                Some(line) => line,
                None => self.lines.recv().await.ok_or(ShellError::ProcessExited)?,
            };
            collector.push(line);
        }

        let (boundary, leftover) = std::mem::take(collector).finish();
        self.phase = Phase::Idle;
        self.backlog.extend(leftover);
        Ok(boundary)
    }

    async fn shutdown(self) {
        drop(self.stdin);
        for reader in &self.readers {
            reader.abort();
        }
        self.handle.terminate().await;
    }
}

fn spawn_reader(
    pipe: OutputPipe,
    tx: mpsc::UnboundedSender<StreamLine>,
    tag: fn(String) -> StreamLine,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(tag(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Interpreter pipe read failed: {}", e);
                    break;
                }
            }
        }
    })
}

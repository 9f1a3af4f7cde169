//! In-process stand-in for the interpreter.
//!
//! [`MockInterpreter`] speaks the same sentinel protocol as a real
//! interactive interpreter over `tokio::io::duplex` pipes, so sessions and
//! the handlers built on top of them can be tested without Python. Replies
//! come from a responder closure; every received command and every reply is
//! logged as a [`MockEvent`] in arrival order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

use crate::boundary::{STDERR_SENTINEL, STDOUT_SENTINEL};
use crate::error::ShellResult;
use crate::launcher::{Launched, Launcher, ProcessHandle};

const PIPE_CAPACITY: usize = 64 * 1024;
const DEFAULT_BANNER: &str = "Python 3.12.0 (mock)\nType \"help\" for more information.";

/// What the mock writes back for one command.
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    pub stdout: String,
    pub stderr: String,
    pub delay: Option<Duration>,
    /// Never answer.
    pub hang: bool,
}

impl MockReply {
    /// Reply with `stdout` and a clean error channel.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Reply with no output at all.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Reply with text on the error channel.
    pub fn error(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Never reply.
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Wait before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Something the mock observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Launched,
    Received(String),
    Replied(String),
}

type Responder = dyn Fn(&str) -> MockReply + Send + Sync;

/// Fake interactive interpreter.
pub struct MockInterpreter {
    responder: Arc<Responder>,
    banner: String,
    events: Arc<Mutex<Vec<MockEvent>>>,
    launches: AtomicUsize,
}

impl MockInterpreter {
    /// Create a mock answering non-empty commands with `responder`.
    ///
    /// The empty no-op command issued by `start()` is answered with a banner
    /// on the error channel, like a real interactive interpreter.
    pub fn new(responder: impl Fn(&str) -> MockReply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Arc::new(responder),
            banner: DEFAULT_BANNER.to_string(),
            events: Arc::new(Mutex::new(Vec::new())),
            launches: AtomicUsize::new(0),
        })
    }

    /// A mock that accepts every command and prints nothing.
    pub fn silent() -> Arc<Self> {
        Self::new(|_| MockReply::silent())
    }

    /// Everything observed so far.
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    /// Non-empty commands received, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MockEvent::Received(cmd) if !cmd.is_empty() => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of times the mock has been launched.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for MockInterpreter {
    fn describe(&self) -> String {
        "mock interpreter".to_string()
    }

    async fn launch(&self) -> ShellResult<Launched> {
        let (stdin, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_remote, stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_remote, stderr) = tokio::io::duplex(PIPE_CAPACITY);

        self.launches.fetch_add(1, Ordering::SeqCst);
        lock(&self.events).push(MockEvent::Launched);

        let task = tokio::spawn(serve(
            stdin_remote,
            stdout_remote,
            stderr_remote,
            Arc::clone(&self.responder),
            self.banner.clone(),
            Arc::clone(&self.events),
        ));

        Ok(Launched {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            handle: ProcessHandle::Task(task),
        })
    }
}

async fn serve(
    stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
    responder: Arc<Responder>,
    banner: String,
    events: Arc<Mutex<Vec<MockEvent>>>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let intake_events = Arc::clone(&events);

    // Reads framed commands off stdin as soon as they arrive, so the event
    // log shows when the session actually wrote them.
    let intake = async move {
        let stdout_marker = format!("print(\"{STDOUT_SENTINEL}\")");
        let mut lines = BufReader::new(stdin).lines();
        let mut block: Vec<String> = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.starts_with(&stdout_marker) {
                let command = block.join("\n").trim().to_string();
                block.clear();
                lock(&intake_events).push(MockEvent::Received(command.clone()));
                if tx.send(command).is_err() {
                    break;
                }
            } else if line.starts_with("from sys import stderr") {
                continue;
            } else {
                block.push(line);
            }
        }
    };

    let respond = async move {
        while let Some(command) = rx.recv().await {
            let reply = if command.is_empty() {
                MockReply::error(banner.clone())
            } else {
                (*responder)(&command)
            };

            if reply.hang {
                std::future::pending::<()>().await;
            }
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }

            lock(&events).push(MockEvent::Replied(command));
            if write_reply(&mut stdout, &mut stderr, &reply).await.is_err() {
                break;
            }
        }
    };

    tokio::join!(intake, respond);
}

async fn write_reply(
    stdout: &mut DuplexStream,
    stderr: &mut DuplexStream,
    reply: &MockReply,
) -> std::io::Result<()> {
    let mut out = String::new();
    push_line(&mut out, &reply.stdout);
    out.push_str(STDOUT_SENTINEL);
    out.push('\n');
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await?;

    // Interactive prompts are echoed on stderr without a newline.
    let mut err = String::from(">>> ");
    push_line(&mut err, &reply.stderr);
    err.push_str(">>> ");
    err.push_str(STDERR_SENTINEL);
    err.push('\n');
    stderr.write_all(err.as_bytes()).await?;
    stderr.flush().await
}

fn push_line(buffer: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    buffer.push_str(text);
    if !text.ends_with('\n') {
        buffer.push('\n');
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

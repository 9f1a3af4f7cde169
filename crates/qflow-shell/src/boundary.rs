//! Sentinel framing for interpreter commands.
//!
//! The interpreter is an interactive REPL with no request/response framing.
//! After every command two marker lines are injected, one printed on each
//! output channel:
//!
//! ```text
//!   <command>
//!   print("#StdoutEnd#")
//!   from sys import stderr; print("#StderrEnd#", file=stderr)
//! ```
//!
//! A command is complete once *both* markers have been observed. The two
//! channels are independent byte streams, so neither marker alone says
//! anything about the other channel.

use crate::error::{ShellError, ShellResult};

/// Boundary marker printed on standard output.
pub const STDOUT_SENTINEL: &str = "#StdoutEnd#";

/// Boundary marker printed on standard error.
pub const STDERR_SENTINEL: &str = "#StderrEnd#";

/// Prompt echo artifacts the interactive interpreter writes to stderr.
const PROMPT_ARTIFACTS: [&str; 2] = [">>>", "..."];

/// Wrap a command with the two sentinel-printing statements.
pub fn frame_command(command: &str) -> String {
    let mut framed = String::with_capacity(command.len() + 96);
    framed.push('\n');
    framed.push_str(command);
    framed.push('\n');
    framed.push_str(&format!("\nprint(\"{STDOUT_SENTINEL}\")\n"));
    framed.push_str(&format!(
        "from sys import stderr; print(\"{STDERR_SENTINEL}\", file=stderr)\n"
    ));
    framed
}

/// One line read from the interpreter, tagged with its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Stdout(String),
    Stderr(String),
}

/// Output of one command, sentinels removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Boundary {
    pub stdout: String,
    pub stderr: String,
}

impl Boundary {
    /// Error-channel text with prompt echoes stripped.
    pub fn error_text(&self) -> String {
        let mut text = self.stderr.clone();
        for artifact in PROMPT_ARTIFACTS {
            text = text.replace(artifact, "");
        }
        text.trim().to_string()
    }

    /// Resolve to the trimmed stdout, or to an interpreter error if anything
    /// reached the error channel.
    pub fn into_output(self) -> ShellResult<String> {
        let error = self.error_text();
        if error.is_empty() {
            Ok(self.stdout.trim().to_string())
        } else {
            Err(ShellError::Interpreter(error))
        }
    }
}

/// Accumulates lines until both sentinels have been seen.
#[derive(Debug, Default)]
pub(crate) struct BoundaryCollector {
    boundary: Boundary,
    stdout_done: bool,
    stderr_done: bool,
    leftover: Vec<StreamLine>,
}

impl BoundaryCollector {
    pub(crate) fn push(&mut self, line: StreamLine) {
        match line {
            StreamLine::Stdout(text) if !self.stdout_done => {
                self.stdout_done = absorb(
                    &text,
                    STDOUT_SENTINEL,
                    &mut self.boundary.stdout,
                    &mut self.leftover,
                    StreamLine::Stdout,
                );
            }
            StreamLine::Stderr(text) if !self.stderr_done => {
                self.stderr_done = absorb(
                    &text,
                    STDERR_SENTINEL,
                    &mut self.boundary.stderr,
                    &mut self.leftover,
                    StreamLine::Stderr,
                );
            }
            // Past this channel's boundary: belongs to the next command.
            other => self.leftover.push(other),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.stdout_done && self.stderr_done
    }

    /// Split into the finished boundary and lines to replay for the next command.
    pub(crate) fn finish(self) -> (Boundary, Vec<StreamLine>) {
        (self.boundary, self.leftover)
    }
}

/// Append `text` to `buffer`, stopping at `sentinel`. Returns whether the
/// sentinel was found; anything after it on the same line is kept aside.
fn absorb(
    text: &str,
    sentinel: &str,
    buffer: &mut String,
    leftover: &mut Vec<StreamLine>,
    tag: fn(String) -> StreamLine,
) -> bool {
    match text.find(sentinel) {
        Some(pos) => {
            buffer.push_str(&text[..pos]);
            let rest = &text[pos + sentinel.len()..];
            if !rest.trim().is_empty() {
                leftover.push(tag(rest.to_string()));
            }
            true
        }
        None => {
            buffer.push_str(text);
            buffer.push('\n');
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(s: &str) -> StreamLine {
        StreamLine::Stdout(s.to_string())
    }

    fn err(s: &str) -> StreamLine {
        StreamLine::Stderr(s.to_string())
    }

    #[test]
    fn test_frame_command() {
        let framed = frame_command("x = 1+1");
        assert_eq!(
            framed,
            "\nx = 1+1\n\nprint(\"#StdoutEnd#\")\nfrom sys import stderr; print(\"#StderrEnd#\", file=stderr)\n"
        );
    }

    #[test]
    fn test_needs_both_sentinels() {
        let mut collector = BoundaryCollector::default();
        collector.push(out("2"));
        collector.push(out(STDOUT_SENTINEL));
        assert!(!collector.is_complete());
        collector.push(err(&format!(">>> >>> {STDERR_SENTINEL}")));
        assert!(collector.is_complete());

        let (boundary, leftover) = collector.finish();
        assert!(leftover.is_empty());
        assert_eq!(boundary.into_output().unwrap(), "2");
    }

    #[test]
    fn test_stderr_first_still_waits_for_stdout() {
        let mut collector = BoundaryCollector::default();
        collector.push(err(STDERR_SENTINEL));
        assert!(!collector.is_complete());
        collector.push(out("hello"));
        collector.push(out(STDOUT_SENTINEL));
        assert!(collector.is_complete());
    }

    #[test]
    fn test_sentinel_never_in_output() {
        let mut collector = BoundaryCollector::default();
        collector.push(out(&format!("partial{STDOUT_SENTINEL}")));
        collector.push(err(STDERR_SENTINEL));
        let (boundary, _) = collector.finish();
        let output = boundary.into_output().unwrap();
        assert_eq!(output, "partial");
        assert!(!output.contains(STDOUT_SENTINEL));
    }

    #[test]
    fn test_error_channel_text_is_failure() {
        let mut collector = BoundaryCollector::default();
        collector.push(out(STDOUT_SENTINEL));
        collector.push(err(">>> Traceback (most recent call last):"));
        collector.push(err("NameError: name 'y' is not defined"));
        collector.push(err(&format!(">>> ... {STDERR_SENTINEL}")));
        let (boundary, _) = collector.finish();
        match boundary.into_output() {
            Err(ShellError::Interpreter(msg)) => {
                assert!(msg.starts_with("Traceback"));
                assert!(msg.ends_with("NameError: name 'y' is not defined"));
                assert!(!msg.contains(">>>"));
            }
            other => panic!("expected interpreter error, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_only_stderr_is_success() {
        let boundary = Boundary {
            stdout: "ok\n".into(),
            stderr: ">>> >>> ... >>> ".into(),
        };
        assert_eq!(boundary.into_output().unwrap(), "ok");
    }

    #[test]
    fn test_lines_after_boundary_are_kept_for_next_command() {
        let mut collector = BoundaryCollector::default();
        collector.push(out(STDOUT_SENTINEL));
        collector.push(out("late"));
        collector.push(err(&format!("{STDERR_SENTINEL} tail")));
        let (boundary, leftover) = collector.finish();
        assert_eq!(boundary.stdout, "");
        assert_eq!(leftover, vec![out("late"), err(" tail")]);
    }
}

//! Subprocess supervision for engine invocations.
//!
//! Every engine interaction goes through [`CommandRunner`] so gateway logic
//! can be tested against scripted outcomes. The tokio-backed implementation
//! drains stdout and stderr while the process runs and kills the process
//! once its deadline passes; the deadline covers stream close as well as
//! process exit. Spawn failures stay on the error arm so callers can tell
//! "binary missing" apart from "command failed".

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// One engine invocation: program, arguments, optional deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Bound the invocation by a wall-clock deadline.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The process exited on its own, with any exit code.
    Completed {
        /// Exit code, absent when the process died from a signal
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The deadline elapsed and the process was killed.
    TimedOut,
}

/// Runs engine commands and supervises their lifetime.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> std::io::Result<ProcessOutcome>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: CommandSpec) -> std::io::Result<ProcessOutcome> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let deadline = spec
            .timeout
            .map(|limit| tokio::time::Instant::now() + limit);

        // Both pipes must be drained while the process runs; waiting for
        // exit first deadlocks once either pipe buffer fills up.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut drain = tokio::spawn(async move {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let read_stdout = async {
                if let Some(pipe) = stdout_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut stdout).await;
                }
            };
            let read_stderr = async {
                if let Some(pipe) = stderr_pipe.as_mut() {
                    let _ = pipe.read_to_end(&mut stderr).await;
                }
            };
            tokio::join!(read_stdout, read_stderr);
            (stdout, stderr)
        });

        let status = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    if let Err(err) = child.kill().await {
                        log::warn!(
                            "Failed to kill timed-out process '{}': {}",
                            spec.program,
                            err
                        );
                    }
                    drain.abort();
                    return Ok(ProcessOutcome::TimedOut);
                }
            },
            None => child.wait().await?,
        };

        // The same deadline bounds the drain: a straggler that inherited
        // the pipes can hold the reads open after the child itself exited.
        let drained = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut drain).await {
                Ok(joined) => joined,
                Err(_) => {
                    drain.abort();
                    return Ok(ProcessOutcome::TimedOut);
                }
            },
            None => drain.await,
        };

        let (stdout, stderr) = drained.map_err(|err| {
            std::io::Error::other(format!("Output capture failed: {}", err))
        })?;

        Ok(ProcessOutcome::Completed {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let outcome = TokioCommandRunner
            .run(sh("printf out; printf err >&2; exit 3"))
            .await
            .unwrap();

        match outcome {
            ProcessOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stdout, "out");
                assert_eq!(stderr, "err");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn zero_exit_reports_code_zero() {
        let outcome = TokioCommandRunner.run(sh("true")).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Completed {
                exit_code: Some(0),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn kills_processes_that_outlive_the_deadline() {
        let start = Instant::now();
        let outcome = TokioCommandRunner
            .run(sh("sleep 30").with_timeout(Duration::from_millis(200)))
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::TimedOut);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "the child must be killed at the deadline, not awaited to completion"
        );
    }

    #[tokio::test]
    async fn stragglers_holding_the_pipes_do_not_outlive_the_deadline() {
        // The child exits at once, but the backgrounded grandchild keeps
        // the inherited pipes open long past the deadline.
        let start = Instant::now();
        let outcome = TokioCommandRunner
            .run(sh("(sleep 30) & printf started; exit 0").with_timeout(Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(outcome, ProcessOutcome::TimedOut);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "stream capture must be cut off at the deadline, not awaited to EOF"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let spec = CommandSpec::new("definitely-not-a-real-binary", Vec::new());
        let err = TokioCommandRunner.run(spec).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn large_output_on_both_streams_does_not_deadlock() {
        // Pushes well past the 64 KiB pipe buffer on each stream.
        let outcome = TokioCommandRunner
            .run(sh(
                "i=0; while [ $i -lt 20000 ]; do echo 0123456789; echo 9876543210 >&2; i=$((i+1)); done",
            ))
            .await
            .unwrap();

        match outcome {
            ProcessOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                assert_eq!(exit_code, Some(0));
                assert_eq!(stdout.len(), 11 * 20000);
                assert_eq!(stderr.len(), 11 * 20000);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }
}

//! Podman-backed implementation of the container gateway.
//!
//! Submissions run in rootless containers wrapped in GNU `timeout`, with a
//! second, longer deadline enforced on the engine process itself so a wedged
//! container cannot hold a request open forever.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EngineConfig, CODE_FILENAME};
use crate::engine::process::{CommandRunner, CommandSpec, ProcessOutcome, TokioCommandRunner};
use crate::engine::{ContainerEngine, EngineStatus, RunOutput};
use crate::errors::ExecutionError;

/// Exit status GNU `timeout` reports when it kills the wrapped command.
const INNER_TIMEOUT_EXIT_CODE: i32 = 124;

/// Command the runtime image runs against the staged file.
const RUNTIME_COMMAND: &str = "carrion";

/// In-container mount point of the session workspace.
const WORKSPACE_MOUNT: &str = "/app";

/// Container name for a session.
pub fn container_name(session_id: &str) -> String {
    format!("carrion-exec-{}", session_id)
}

/// Gateway to a Podman-compatible container engine CLI.
pub struct PodmanEngine {
    config: EngineConfig,
    runner: Arc<dyn CommandRunner>,
}

impl PodmanEngine {
    /// Create a gateway that spawns the engine binary directly.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioCommandRunner))
    }

    /// Create a gateway with a custom process runner (used by tests).
    pub fn with_runner(config: EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Argument vector for one confined run.
    ///
    /// Kept as a pure function so the sandbox contract can be checked
    /// without an engine installed.
    pub fn run_args(&self, session_id: &str, workspace: &Path) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name(session_id),
            "--network".to_string(),
            "none".to_string(),
            "--memory".to_string(),
            self.config.memory_limit.clone(),
            "--cpus".to_string(),
            self.config.cpu_limit.to_string(),
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
            "--read-only".to_string(),
            "--tmpfs".to_string(),
            "/tmp".to_string(),
            "--volume".to_string(),
            format!("{}:{}:ro", workspace.display(), WORKSPACE_MOUNT),
            "--workdir".to_string(),
            WORKSPACE_MOUNT.to_string(),
            "--user".to_string(),
            self.config.user.clone(),
            self.config.image.clone(),
            "timeout".to_string(),
            format!("{}s", self.config.exec_timeout.as_secs()),
            RUNTIME_COMMAND.to_string(),
            CODE_FILENAME.to_string(),
        ]
    }

    fn image_check_args(&self) -> Vec<String> {
        vec![
            "images".to_string(),
            self.config.image.clone(),
            "--format".to_string(),
            "{{.Repository}}".to_string(),
        ]
    }

    fn pull_args(&self) -> Vec<String> {
        vec!["pull".to_string(), self.config.image.clone()]
    }

    fn pull_error(&self, reason: impl Into<String>) -> ExecutionError {
        ExecutionError::ImagePullFailed {
            image: self.config.image.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ContainerEngine for PodmanEngine {
    async fn probe(&self) -> EngineStatus {
        let spec = CommandSpec::new(&self.config.binary, vec!["--version".to_string()]);
        match self.runner.run(spec).await {
            Ok(ProcessOutcome::Completed {
                exit_code: Some(0),
                stdout,
                ..
            }) => EngineStatus {
                available: true,
                version: Some(stdout.trim().to_string()),
                error: None,
            },
            Ok(ProcessOutcome::Completed { stderr, .. }) => {
                let reason = if stderr.trim().is_empty() {
                    format!("{} version check failed", self.config.binary)
                } else {
                    stderr.trim().to_string()
                };
                EngineStatus {
                    available: false,
                    version: None,
                    error: Some(reason),
                }
            }
            Ok(ProcessOutcome::TimedOut) => EngineStatus {
                available: false,
                version: None,
                error: Some(format!("{} version check timed out", self.config.binary)),
            },
            Err(err) => EngineStatus {
                available: false,
                version: None,
                error: Some(err.to_string()),
            },
        }
    }

    async fn ensure_image(&self) -> Result<(), ExecutionError> {
        let spec = CommandSpec::new(&self.config.binary, self.image_check_args());
        let outcome = self
            .runner
            .run(spec)
            .await
            .map_err(|err| self.pull_error(err.to_string()))?;

        let present = match outcome {
            ProcessOutcome::Completed {
                exit_code: Some(0),
                stdout,
                ..
            } => !stdout.trim().is_empty(),
            ProcessOutcome::Completed { stderr, .. } => {
                return Err(self.pull_error(stderr.trim().to_string()));
            }
            ProcessOutcome::TimedOut => {
                return Err(self.pull_error("image lookup timed out"));
            }
        };

        if present {
            return Ok(());
        }

        log::info!(
            "Runtime image {} not found locally, pulling",
            self.config.image
        );
        let spec = CommandSpec::new(&self.config.binary, self.pull_args())
            .with_timeout(self.config.pull_timeout);
        match self.runner.run(spec).await {
            Ok(ProcessOutcome::Completed {
                exit_code: Some(0), ..
            }) => {
                log::info!("Runtime image {} pulled", self.config.image);
                Ok(())
            }
            Ok(ProcessOutcome::Completed { stderr, .. }) => {
                Err(self.pull_error(stderr.trim().to_string()))
            }
            Ok(ProcessOutcome::TimedOut) => Err(self.pull_error(format!(
                "pull timed out after {} seconds",
                self.config.pull_timeout.as_secs()
            ))),
            Err(err) => Err(self.pull_error(err.to_string())),
        }
    }

    async fn run(&self, session_id: &str, workspace: &Path) -> Result<RunOutput, ExecutionError> {
        let args = self.run_args(session_id, workspace);
        log::debug!("Launching container {}", container_name(session_id));
        let spec =
            CommandSpec::new(&self.config.binary, args).with_timeout(self.config.watchdog_timeout);

        match self.runner.run(spec).await {
            Err(err) => Err(ExecutionError::SpawnFailed(err.to_string())),
            Ok(ProcessOutcome::TimedOut) => {
                log::warn!(
                    "Container {} exceeded the supervisory deadline and was killed",
                    container_name(session_id)
                );
                Err(ExecutionError::Timeout(self.config.exec_timeout.as_secs()))
            }
            Ok(ProcessOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            }) => {
                if exit_code == Some(INNER_TIMEOUT_EXIT_CODE) {
                    return Err(ExecutionError::Timeout(self.config.exec_timeout.as_secs()));
                }
                let success = exit_code == Some(0);
                Ok(RunOutput {
                    success,
                    output: stdout,
                    // Diagnostics from a successful run are incidental noise,
                    // not an error signal.
                    stderr: if success { String::new() } else { stderr },
                    exit_code,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted outcomes and records every invocation.
    struct ScriptedRunner {
        outcomes: Mutex<VecDeque<io::Result<ProcessOutcome>>>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn new(outcomes: Vec<io::Result<ProcessOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: CommandSpec) -> io::Result<ProcessOutcome> {
            self.calls.lock().unwrap().push(spec);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("runner invoked more times than scripted")
        }
    }

    fn completed(exit_code: i32, stdout: &str, stderr: &str) -> io::Result<ProcessOutcome> {
        Ok(ProcessOutcome::Completed {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    fn engine_with(
        outcomes: Vec<io::Result<ProcessOutcome>>,
    ) -> (PodmanEngine, Arc<ScriptedRunner>) {
        let runner = ScriptedRunner::new(outcomes);
        let engine = PodmanEngine::with_runner(EngineConfig::default(), runner.clone());
        (engine, runner)
    }

    #[test]
    fn run_args_enforce_the_sandbox_contract() {
        let engine = PodmanEngine::new(EngineConfig::default());
        let args = engine.run_args(
            "0011223344556677",
            Path::new("/tmp/carrion-0011223344556677"),
        );
        let rendered = args.join(" ");

        assert!(rendered.starts_with("run --rm --name carrion-exec-0011223344556677"));
        assert!(rendered.contains("--network none"));
        assert!(rendered.contains("--memory 64m"));
        assert!(rendered.contains("--cpus 0.5"));
        assert!(rendered.contains("--security-opt no-new-privileges"));
        assert!(rendered.contains("--read-only"));
        assert!(rendered.contains("--tmpfs /tmp"));
        assert!(rendered.contains("--volume /tmp/carrion-0011223344556677:/app:ro"));
        assert!(rendered.contains("--workdir /app"));
        assert!(rendered.contains("--user 1001:1001"));
        let tail = format!("{} timeout 10s carrion main.crl", EngineConfig::default().image);
        assert!(rendered.ends_with(tail.as_str()));
    }

    #[tokio::test]
    async fn probe_reports_version_when_engine_responds() {
        let (engine, runner) = engine_with(vec![completed(0, "podman version 4.9.3\n", "")]);
        let status = engine.probe().await;

        assert!(status.available);
        assert_eq!(status.version.as_deref(), Some("podman version 4.9.3"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "podman");
        assert_eq!(calls[0].args, vec!["--version".to_string()]);
    }

    #[tokio::test]
    async fn probe_reports_unavailable_on_spawn_failure() {
        let (engine, _runner) = engine_with(vec![Err(io::Error::new(
            io::ErrorKind::NotFound,
            "No such file or directory",
        ))]);
        let status = engine.probe().await;

        assert!(!status.available);
        assert!(status.version.is_none());
        assert!(status.error.unwrap().contains("No such file"));
    }

    #[tokio::test]
    async fn ensure_image_skips_pull_when_image_is_cached() {
        let (engine, runner) =
            engine_with(vec![completed(0, "docker.io/javanhut/carrionlanguage\n", "")]);
        engine.ensure_image().await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1, "a cached image must not trigger a pull");
        assert_eq!(calls[0].args[0], "images");
    }

    #[tokio::test]
    async fn ensure_image_pulls_with_a_deadline_when_missing() {
        let (engine, runner) = engine_with(vec![completed(0, "", ""), completed(0, "", "")]);
        engine.ensure_image().await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[0], "pull");
        assert_eq!(calls[1].args[1], EngineConfig::default().image);
        assert_eq!(calls[1].timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn ensure_image_surfaces_pull_timeout_distinctly() {
        let (engine, _runner) =
            engine_with(vec![completed(0, "", ""), Ok(ProcessOutcome::TimedOut)]);
        let err = engine.ensure_image().await.unwrap_err();

        assert!(matches!(err, ExecutionError::ImagePullFailed { .. }));
        assert!(err.to_string().contains("timed out after 60 seconds"));
    }

    #[tokio::test]
    async fn ensure_image_surfaces_pull_failure() {
        let (engine, _runner) = engine_with(vec![
            completed(0, "", ""),
            completed(125, "", "Error: registry unreachable"),
        ]);
        let err = engine.ensure_image().await.unwrap_err();

        assert!(matches!(err, ExecutionError::ImagePullFailed { .. }));
        assert!(err.to_string().contains("registry unreachable"));
    }

    #[tokio::test]
    async fn run_discards_stderr_on_success() {
        let (engine, _runner) =
            engine_with(vec![completed(0, "hi\n", "warning: deprecated syntax\n")]);
        let output = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.output, "hi\n");
        assert_eq!(output.stderr, "");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn run_keeps_stderr_on_failure() {
        let (engine, _runner) = engine_with(vec![completed(1, "", "Traceback: boom\n")]);
        let output = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.stderr, "Traceback: boom\n");
        assert_eq!(output.exit_code, Some(1));
    }

    #[tokio::test]
    async fn run_maps_wrapper_kill_to_timeout() {
        let (engine, _runner) = engine_with(vec![completed(124, "", "")]);
        let err = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(10)));
        assert_eq!(err.to_string(), "Execution timeout (10 seconds)");
    }

    #[tokio::test]
    async fn run_maps_supervisory_deadline_to_timeout() {
        let (engine, runner) = engine_with(vec![Ok(ProcessOutcome::TimedOut)]);
        let err = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(_)));
        let calls = runner.calls();
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(12)));
    }

    #[tokio::test]
    async fn run_maps_spawn_failure_distinctly() {
        let (engine, _runner) = engine_with(vec![Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no podman",
        ))]);
        let err = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn killed_runs_report_no_exit_code() {
        let (engine, _runner) = engine_with(vec![Ok(ProcessOutcome::Completed {
            exit_code: None,
            stdout: String::new(),
            stderr: "killed\n".to_string(),
        })]);
        let output = engine
            .run("aabbccddeeff0011", Path::new("/tmp/ws"))
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, None);
        assert_eq!(output.stderr, "killed\n");
    }
}

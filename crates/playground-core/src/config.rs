//! Configuration for the engine gateway and the session executor.

use std::path::PathBuf;
use std::time::Duration;

/// Container engine binary invoked by default.
pub const DEFAULT_ENGINE_BINARY: &str = "podman";

/// Image containing the Carrion interpreter.
pub const DEFAULT_RUNTIME_IMAGE: &str = "docker.io/javanhut/carrionlanguage:latest";

/// Canonical filename the submission is staged under and the interpreter is
/// pointed at inside the container.
pub const CODE_FILENAME: &str = "main.crl";

/// Configuration for the container runtime gateway.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine binary to invoke
    pub binary: String,
    /// Runtime image submissions are executed with
    pub image: String,
    /// Memory ceiling passed to the engine (e.g. "64m")
    pub memory_limit: String,
    /// Fractional CPU share passed to the engine
    pub cpu_limit: f64,
    /// uid:gid the container runs as
    pub user: String,
    /// In-container execution limit, enforced by the timeout wrapper
    pub exec_timeout: Duration,
    /// Supervisory deadline after which the engine process is killed.
    /// Strictly longer than `exec_timeout` to leave room for container
    /// startup and teardown.
    pub watchdog_timeout: Duration,
    /// Upper bound on pulling the runtime image
    pub pull_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE_BINARY.to_string(),
            image: DEFAULT_RUNTIME_IMAGE.to_string(),
            memory_limit: "64m".to_string(),
            cpu_limit: 0.5,
            user: "1001:1001".to_string(),
            exec_timeout: Duration::from_secs(10),
            watchdog_timeout: Duration::from_secs(12),
            pull_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Create a new engine configuration with the default sandbox limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the runtime image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set the memory ceiling (e.g. "64m", "128m").
    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = limit.into();
        self
    }

    /// Set the CPU share (number of cores, may be fractional).
    pub fn with_cpu_limit(mut self, cores: f64) -> Self {
        self.cpu_limit = cores;
        self
    }

    /// Set the uid:gid the container runs as.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the in-container execution limit.
    pub fn with_exec_timeout(mut self, limit: Duration) -> Self {
        self.exec_timeout = limit;
        self
    }

    /// Set the supervisory kill deadline.
    pub fn with_watchdog_timeout(mut self, limit: Duration) -> Self {
        self.watchdog_timeout = limit;
        self
    }

    /// Set the image pull deadline.
    pub fn with_pull_timeout(mut self, limit: Duration) -> Self {
        self.pull_timeout = limit;
        self
    }
}

/// Configuration for the session executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Directory under which per-session workspaces are created
    pub workspace_root: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory sessions stage their workspaces under.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }
}

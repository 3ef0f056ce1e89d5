//! Container-backed execution of playground submissions.
//!
//! The gateway owns all interaction with the host container engine. It
//! probes that the binary works and that the runtime image is present
//! before launching one hardened container per submission. Containers run
//! with no network, a read-only root filesystem, fixed memory and CPU
//! ceilings, and a non-privileged identity, so a submission can observe
//! nothing but its own staged input.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;

pub mod podman;
pub mod process;

pub use podman::PodmanEngine;
pub use process::{CommandRunner, CommandSpec, ProcessOutcome, TokioCommandRunner};

/// Result of probing the engine binary.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub available: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Captured outcome of one containerized run.
///
/// `success` mirrors exit code zero. On success the error stream is cleared
/// even if the interpreter wrote incidental diagnostics, so playground
/// clients never display noise next to a working program. `exit_code` is
/// absent when the process was killed by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub success: bool,
    pub output: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: Option<i32>,
}

/// Abstraction over the container runtime used to execute submissions.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check whether the engine binary is present and responsive.
    async fn probe(&self) -> EngineStatus;

    /// Make sure the runtime image exists locally, pulling it if absent.
    async fn ensure_image(&self) -> Result<(), ExecutionError>;

    /// Run the staged submission in a confined container.
    async fn run(&self, session_id: &str, workspace: &Path) -> Result<RunOutput, ExecutionError>;
}

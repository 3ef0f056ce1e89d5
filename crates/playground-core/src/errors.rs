//! Error types for the playground execution pipeline.

use thiserror::Error;

/// Failures that reject an execution outright.
///
/// A program that runs to completion with a non-zero exit code is not an
/// error: it comes back as a [`RunOutput`](crate::engine::RunOutput) with
/// `success: false` and its captured diagnostics.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The container engine binary is missing or not functional.
    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The runtime image could not be verified or pulled.
    #[error("Failed to ensure image {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    /// The run exceeded a wall-clock limit and was killed.
    #[error("Execution timeout ({0} seconds)")]
    Timeout(u64),

    /// The engine process could not be spawned at all.
    #[error("Failed to launch container: {0}")]
    SpawnFailed(String),

    /// Filesystem failure while staging or removing a workspace.
    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

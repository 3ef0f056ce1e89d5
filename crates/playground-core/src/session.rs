//! Per-request execution sessions.
//!
//! A session stages one submission into its own workspace directory and is
//! torn down unconditionally once the run finishes. Workspace paths and
//! container names both derive from the session identifier, which is what
//! keeps concurrent executions from ever sharing state. Session work is
//! detached from its caller, so an abandoned request cannot cancel a run
//! midway or leave its workspace behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ExecutorConfig, CODE_FILENAME};
use crate::engine::{ContainerEngine, RunOutput};
use crate::errors::ExecutionError;

/// Random bytes behind one session identifier (rendered as hex).
const SESSION_ID_BYTES: usize = 8;

/// Generate a fresh 16-character hex session identifier.
pub fn new_session_id() -> String {
    let bytes: [u8; SESSION_ID_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// An ephemeral execution context owning one workspace directory.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub workspace: PathBuf,
}

impl Session {
    /// Stage `code` into a fresh workspace under `workspace_root`.
    pub async fn create(workspace_root: &Path, code: &str) -> Result<Self, ExecutionError> {
        let id = new_session_id();
        let workspace = workspace_root.join(format!("carrion-{}", id));
        tokio::fs::create_dir_all(&workspace).await?;
        if let Err(err) = tokio::fs::write(workspace.join(CODE_FILENAME), code).await {
            remove_workspace(&workspace).await;
            return Err(err.into());
        }
        Ok(Self { id, workspace })
    }

    /// Remove the workspace tree. Failures are logged, never propagated, so
    /// teardown cannot mask the primary outcome.
    pub async fn destroy(self) {
        remove_workspace(&self.workspace).await;
    }
}

async fn remove_workspace(workspace: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(workspace).await {
        log::error!(
            "Failed to remove workspace {}: {}",
            workspace.display(),
            err
        );
    }
}

/// Turns one submission into one isolated, cleaned-up container run.
pub struct SessionManager {
    engine: Arc<dyn ContainerEngine>,
    config: ExecutorConfig,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: ExecutorConfig) -> Self {
        Self { engine, config }
    }

    /// Execute one submission end to end.
    ///
    /// Engine availability and image presence are checked before anything
    /// touches the filesystem, so environment failures leave no workspace
    /// behind. Once a workspace exists it is removed on every path out.
    /// The pipeline runs on its own task: a caller that stops polling (a
    /// connection dropped mid-request) detaches the work instead of
    /// cancelling it, so the run still completes and teardown still
    /// happens.
    pub async fn execute(&self, code: &str) -> Result<RunOutput, ExecutionError> {
        let engine = self.engine.clone();
        let workspace_root = self.config.workspace_root.clone();
        let code = code.to_string();
        let session_task = tokio::spawn(Self::run_session(engine, workspace_root, code));

        // Never aborted, so a join error can only be a panic inside the
        // session body.
        session_task.await.map_err(|err| {
            ExecutionError::SpawnFailed(format!("session task failed: {}", err))
        })?
    }

    async fn run_session(
        engine: Arc<dyn ContainerEngine>,
        workspace_root: PathBuf,
        code: String,
    ) -> Result<RunOutput, ExecutionError> {
        let status = engine.probe().await;
        if !status.available {
            let reason = status
                .error
                .unwrap_or_else(|| "unknown error".to_string());
            log::warn!("Engine probe failed: {}", reason);
            return Err(ExecutionError::EngineUnavailable(reason));
        }

        if let Err(err) = engine.ensure_image().await {
            log::error!("Runtime image unavailable: {}", err);
            return Err(err);
        }

        let session = Session::create(&workspace_root, &code).await?;
        log::debug!(
            "Session {} staged at {}",
            session.id,
            session.workspace.display()
        );

        let result = engine.run(&session.id, &session.workspace).await;
        if let Err(ref err) = result {
            log::error!("Execution failed for session {}: {}", session.id, err);
        }
        session.destroy().await;
        result
    }
}

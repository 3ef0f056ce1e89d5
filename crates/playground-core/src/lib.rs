//! Server-side execution relay for the Carrion playground.
//!
//! Each code submission is staged into an ephemeral workspace and run
//! inside a locked-down container built from the Carrion runtime image.
//! The crate is split along that seam:
//!
//! - **Engine gateway**: owns every interaction with the container engine,
//!   from availability probing and image presence checks to the hardened
//!   run invocation with its dual wall-clock timeouts.
//! - **Session manager**: owns the per-request lifecycle, meaning unique
//!   session identifiers, workspace staging, delegation to the gateway, and
//!   unconditional workspace teardown.

pub mod config;
pub mod engine;
pub mod errors;
pub mod session;

pub use config::{EngineConfig, ExecutorConfig};
pub use engine::{ContainerEngine, EngineStatus, PodmanEngine, RunOutput};
pub use errors::ExecutionError;
pub use session::SessionManager;

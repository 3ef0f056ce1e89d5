//! HTTP surface for the Carrion playground execution service.
//!
//! Exposes two endpoints: `POST /execute`, which validates a submission and
//! relays it to the container-backed execution core, and `GET /health`, a
//! static liveness acknowledgment. Submission validation lives entirely at
//! this boundary so malformed requests are rejected before any session
//! state exists.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use playground_core::{ExecutionError, RunOutput, SessionManager};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted submission length in characters.
pub const MAX_CODE_CHARS: usize = 10_000;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Configuration for the playground server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".parse().unwrap(),
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address: {}", e)))?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state containing the executor and configuration.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<SessionManager>,
    pub config: ServerConfig,
}

/// Handler for the /execute POST endpoint.
///
/// Validation happens here, before any session exists: the field must be
/// present, a string, non-empty, and within the length cap. Everything past
/// validation is delegated to the session manager.
async fn execute_handler(
    State(app_state): State<AppState>,
    AxumJson(body): AxumJson<Value>,
) -> std::result::Result<Json<RunOutput>, (StatusCode, Json<Value>)> {
    let code = match body.get("code") {
        Some(Value::String(code)) if !code.is_empty() => code.clone(),
        _ => return Err(bad_request("Code is required and must be a string")),
    };

    if code.chars().count() > MAX_CODE_CHARS {
        return Err(bad_request("Code too long (max 10,000 characters)"));
    }

    match app_state.executor.execute(&code).await {
        Ok(output) => Ok(Json(output)),
        Err(err) => {
            log::error!("Execution error: {}", err);
            Err(execution_failed(&err))
        }
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Wire shape for execution failures. The underlying message doubles as the
/// stderr field; playground clients render that field as program output, so
/// both carry the cause.
fn execution_failed(err: &ExecutionError) -> (StatusCode, Json<Value>) {
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Execution failed",
            "message": message,
            "output": "",
            "stderr": message,
        })),
    )
}

/// The playground HTTP server.
pub struct PlaygroundServer {
    executor: Arc<SessionManager>,
    config: ServerConfig,
}

impl PlaygroundServer {
    /// Create a new server with the given executor and default configuration.
    pub fn new(executor: Arc<SessionManager>) -> Self {
        Self {
            executor,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(executor: Arc<SessionManager>, config: ServerConfig) -> Self {
        Self { executor, config }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            executor: self.executor.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/execute", post(execute_handler))
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "ok".to_string(),
                        message: "Carrion Playground API is running".to_string(),
                    })
                }),
            )
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_size));

        // Add middleware layers
        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Keep noisy health polling at debug level
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if uri.path() == "/health" {
                        log::debug!("Response {} completed in {:?}", request_id, duration);
                    } else {
                        log::info!("Response {} completed in {:?}", request_id, duration);
                    }

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("Playground API listening on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Execute endpoint: http://{}/execute", self.config.bind_addr);

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server stops accepting connections when the provided shutdown
    /// signal resolves; in-flight executions finish inside their own
    /// timeout budget.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "Playground API listening on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("Playground API shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

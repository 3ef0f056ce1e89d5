//! playground-server binary
//!
//! HTTP API that runs Carrion playground submissions inside confined,
//! single-use containers.

use anyhow::Result;
use clap::Parser;
use playground_core::config::{DEFAULT_ENGINE_BINARY, DEFAULT_RUNTIME_IMAGE};
use playground_core::{ContainerEngine, EngineConfig, ExecutorConfig, PodmanEngine, SessionManager};
use playground_server::{shutdown_signal, PlaygroundServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments for the playground server.
#[derive(Parser, Debug)]
#[command(name = "playground-server")]
#[command(about = "HTTP API for running Carrion playground submissions in confined containers")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    bind: String,

    /// Enable CORS
    #[arg(long, default_value = "true")]
    cors: bool,

    /// Maximum request body size in bytes
    #[arg(long, default_value = "10485760")] // 10MB
    max_body_size: usize,

    /// Enable request logging
    #[arg(long, default_value = "true")]
    logging: bool,

    /// Container engine binary
    #[arg(long, default_value = DEFAULT_ENGINE_BINARY)]
    engine: String,

    /// Runtime image submissions are executed with
    #[arg(long, default_value = DEFAULT_RUNTIME_IMAGE)]
    image: String,

    /// In-container execution limit in seconds
    #[arg(long, default_value = "10")]
    exec_timeout: u64,

    /// Engine process kill deadline in seconds, must exceed the execution limit
    #[arg(long, default_value = "12")]
    watchdog_timeout: u64,

    /// Directory session workspaces are created under (defaults to the system temp dir)
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    if args.watchdog_timeout <= args.exec_timeout {
        anyhow::bail!(
            "--watchdog-timeout ({}s) must exceed --exec-timeout ({}s)",
            args.watchdog_timeout,
            args.exec_timeout
        );
    }

    // Create server configuration
    let config = ServerConfig::new()
        .with_bind_addr_str(&args.bind)?
        .with_cors(args.cors)
        .with_max_body_size(args.max_body_size)
        .with_logging(args.logging);

    let engine_config = EngineConfig::new()
        .with_binary(&args.engine)
        .with_image(&args.image)
        .with_exec_timeout(Duration::from_secs(args.exec_timeout))
        .with_watchdog_timeout(Duration::from_secs(args.watchdog_timeout));

    let mut executor_config = ExecutorConfig::new();
    if let Some(root) = args.workspace_root {
        executor_config = executor_config.with_workspace_root(root);
    }

    let engine = Arc::new(PodmanEngine::new(engine_config));

    // Surface engine problems at startup instead of on the first request
    let status = engine.probe().await;
    if status.available {
        log::info!(
            "Container engine detected: {}",
            status.version.unwrap_or_default()
        );
    } else {
        log::warn!(
            "Container engine unavailable: {}",
            status.error.unwrap_or_else(|| "unknown error".to_string())
        );
        log::warn!(
            "Submissions will fail until {} is installed and on PATH",
            args.engine
        );
    }

    let executor = Arc::new(SessionManager::new(engine, executor_config));

    log::info!("Starting playground server...");
    log::info!("Configuration:");
    log::info!("  Bind address: {}", config.bind_addr);
    log::info!("  CORS enabled: {}", args.cors);
    log::info!("  Max body size: {} bytes", args.max_body_size);
    log::info!("  Engine binary: {}", args.engine);
    log::info!("  Runtime image: {}", args.image);
    log::info!(
        "  Execution timeout: {}s (watchdog {}s)",
        args.exec_timeout,
        args.watchdog_timeout
    );

    let server = PlaygroundServer::with_config(executor, config);

    // Start server with graceful shutdown
    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}

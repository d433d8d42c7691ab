use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bruteguard::access::AccessLists;
use bruteguard::config::{BruteguardConfig, LoggingConfig, StorageBackend};
use bruteguard::engine::Authorizer;
use bruteguard::grpc::GrpcServer;
use bruteguard::ratelimit::RateLimiter;
use bruteguard::storage::{MemoryStore, NetworkStore, SqliteStore};

/// Brute-force protection service for login endpoints.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = BruteguardConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Bruteguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    // Access lists are loaded once from storage and written through after.
    let store: Arc<dyn NetworkStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite => Arc::new(SqliteStore::connect(&config.storage.sqlite_path).await?),
    };
    let lists = Arc::new(AccessLists::load(store).await?);

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limiting.to_limiter_config()?,
    )?);

    let authorizer = Arc::new(Authorizer::new(lists, Arc::clone(&rate_limiter)));
    let grpc_server = GrpcServer::new(config.server.grpc_addr, authorizer);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    rate_limiter.shutdown().await;

    info!("Bruteguard stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

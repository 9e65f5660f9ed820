//! Shell Cache - Offline-first request cache for a web front-end

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;
use shell_cache_api::{AppState, create_router};
use shell_cache_core::CacheWorker;
use shell_cache_fetch::{HttpFetcher, HttpFetcherConfig};
use shell_cache_storage::{CacheStorage, LocalStorage, MemoryStorage};

/// Shell Cache - Offline-first request cache for a web front-end
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "SHELL_CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "SHELL_CACHE_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run install and activate once, print the reports, then exit
    Install,
    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::InitConfig { path }) = &args.command {
        return Config::default().save(path);
    }

    let config = Config::load(&args.config)?;

    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting Shell Cache v{}", env!("CARGO_PKG_VERSION"));

    let bind_addr = args
        .bind
        .clone()
        .unwrap_or_else(|| config.server.bind_address.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind_addr, port))?;

    config.ensure_origin_is_not_self(&bind_addr, port)?;

    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    let storage = build_storage(&config).await?;

    let fetcher = Arc::new(
        HttpFetcher::new(HttpFetcherConfig {
            user_agent: config
                .fetch
                .user_agent
                .clone()
                .or_else(|| HttpFetcherConfig::default().user_agent),
            skip_tls_verify: config.fetch.skip_tls_verify,
        })
        .context("Failed to create HTTP client")?,
    );

    let worker = Arc::new(
        CacheWorker::new(config.manifest(), config.route_config()?, storage, fetcher)
            .context("Invalid worker configuration")?,
    );

    let install = worker.install().await.context("Install failed")?;
    let activate = worker.activate().await.context("Activation failed")?;

    if let Some(Command::Install) = &args.command {
        worker.flush().await;
        let summary = serde_json::json!({ "install": install, "activate": activate });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let app = create_router(AppState::new(worker.clone()), metrics_handle)
        .layer(TraceLayer::new_for_http());

    info!("Listening on {}", addr);
    info!("Origin: {}", worker.origin());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let detached cache writes land before exit
    worker.flush().await;

    info!("Server stopped");
    Ok(())
}

/// Select the storage backend named in the config
async fn build_storage(config: &Config) -> Result<Arc<dyn CacheStorage>> {
    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        "local" => {
            info!("Using local storage at {}", config.storage.path);
            let storage = LocalStorage::new(&config.storage.path)
                .await
                .with_context(|| format!("Failed to open storage at {}", config.storage.path))?;
            Ok(Arc::new(storage))
        }
        other => bail!("Unknown storage backend: {}", other),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

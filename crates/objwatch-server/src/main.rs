//! objwatch server - main entry point

use anyhow::{Context, Result};
use clap::Parser;
use objwatch_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use objwatch_server::{
    api::{self, AppState},
    config::{Config, StoreBackend},
    db::{self, InMemoryObjectStore, ObjectStore, PgObjectStore},
    pipeline::{HttpDetailFetcher, Pipeline, Supervisor},
};

#[derive(Debug, Parser)]
#[command(name = "objwatch-server", version, about = "Object liveness tracker")]
struct Cli {
    /// HTTP listen address for callbacks, e.g. `:9090` or `127.0.0.1:9090`
    #[arg(long, env = "OBJWATCH_CALLBACK")]
    callback: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("objwatch-server")
        .filter_directives("objwatch_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting objwatch server");

    let mut config = Config::load()?;
    if let Some(addr) = cli.callback.as_deref() {
        config.server.set_listen_addr(addr)?;
    }
    info!(
        listen = %config.server.listen_addr(),
        provider = %config.provider.base_url,
        backend = ?config.store_backend,
        "Configuration loaded"
    );

    let supervisor = Supervisor::new();

    let store = match connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            supervisor.fatal(format!("{:#}", e));
            return Err(e);
        },
    };

    let fetcher = Arc::new(
        HttpDetailFetcher::new(&config.provider).context("Failed to build provider client")?,
    );
    let pipeline = Pipeline::start(&config.pipeline, fetcher, store, supervisor.clone());
    let _signals = supervisor.spawn_signal_listener();

    match tokio::net::TcpListener::bind(config.server.listen_addr()).await {
        Ok(listener) => {
            info!("Listening for callbacks on {}", config.server.listen_addr());
            let router = api::create_router(AppState::from_pipeline(&pipeline));
            if let Err(e) = api::serve(listener, router, supervisor.token()).await {
                supervisor.fatal(format!("ingest server failed: {}", e));
            }
        },
        Err(e) => {
            supervisor.fatal(format!(
                "cannot bind ingest listener on {}: {}",
                config.server.listen_addr(),
                e
            ));
        },
    }

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    info!("Draining pipeline (up to {:?})", drain_timeout);
    let report = tokio::time::timeout(drain_timeout, pipeline.shutdown())
        .await
        .map_err(|_| anyhow::anyhow!("Pipeline did not drain within {:?}", drain_timeout))?;

    info!(
        cause = %report.cause,
        received = report.stats.received,
        admitted = report.stats.admitted,
        stored = report.stats.stored,
        fetch_errors = report.stats.fetch_errors,
        errors_dropped = report.stats.errors_dropped,
        "Server shut down"
    );

    if report.cause.is_fatal() {
        error!(cause = %report.cause, "Exiting after fatal error");
        anyhow::bail!("objwatch stopped: {}", report.cause);
    }

    Ok(())
}

/// Connect the configured backend. Failure here is fatal.
async fn connect_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; records do not survive a restart");
            Ok(Arc::new(InMemoryObjectStore::new()))
        },
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database)
                .await
                .context("Failed to connect to the object store")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;

            Ok(Arc::new(PgObjectStore::new(pool)))
        },
    }
}

//! Configuration management
//!
//! Everything is resolved from the environment (after loading `.env`) into
//! plain values before the pipeline starts.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default ingest listen host.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default ingest listen port.
pub const DEFAULT_SERVER_PORT: u16 = 9090;

/// Default bound on the shutdown drain phase in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Database Configuration Constants
// ============================================================================

pub const DEFAULT_PSQL_HOST: &str = "objects";
pub const DEFAULT_PSQL_PORT: u16 = 5432;
pub const DEFAULT_PSQL_USER: &str = "postgres";
pub const DEFAULT_PSQL_PASSWORD: &str = "12345";
pub const DEFAULT_PSQL_DB_NAME: &str = "objects";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default detail provider base URL.
pub const DEFAULT_PROVIDER_URL: &str = "http://host.docker.internal:9010";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 16;
pub const DEFAULT_ADMISSION_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RESULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_ERROR_BUFFER_CAPACITY: usize = 1024;

/// Records not refreshed within this many seconds are evicted.
pub const DEFAULT_RETENTION_TTL_SECS: u64 = 30;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub store_backend: StoreBackend,
}

/// Ingest listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Override host and port from a `host:port` or `:port` address.
    pub fn set_listen_addr(&mut self, addr: &str) -> anyhow::Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Invalid listen address '{}': expected host:port", addr))?;
        self.port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen port in '{}': {}", addr, e))?;
        if !host.is_empty() {
            self.host = host.to_string();
        }
        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Detail provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub fetch_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// How the sweeper removes stale records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// One `lastseen < cutoff` delete per tick
    #[default]
    Targeted,
    /// Scan all records and delete stale ids one at a time
    RowByRow,
}

impl FromStr for SweepMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "targeted" => Ok(SweepMode::Targeted),
            "row_by_row" | "rows" => Ok(SweepMode::RowByRow),
            _ => Err(anyhow::anyhow!("Invalid sweep mode: {}", s)),
        }
    }
}

/// Durable store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store, for development without a database
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            _ => Err(anyhow::anyhow!("Invalid store backend: {}", s)),
        }
    }
}

/// Pipeline sizing and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub worker_pool_size: usize,
    pub admission_queue_capacity: usize,
    pub result_queue_capacity: usize,
    pub error_buffer_capacity: usize,
    pub fetch_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub retention_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_mode: SweepMode,
    /// How long an admitted id blocks re-admission; `None` keeps it forever
    pub dedup_retention_secs: Option<u64>,
    pub dedup_max_entries: Option<usize>,
}

impl PipelineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn dedup_retention(&self) -> Option<Duration> {
        self.dedup_retention_secs.map(Duration::from_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            admission_queue_capacity: DEFAULT_ADMISSION_QUEUE_CAPACITY,
            result_queue_capacity: DEFAULT_RESULT_QUEUE_CAPACITY,
            error_buffer_capacity: DEFAULT_ERROR_BUFFER_CAPACITY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            retention_ttl_secs: DEFAULT_RETENTION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_mode: SweepMode::Targeted,
            dedup_retention_secs: None,
            dedup_max_entries: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Build a connection URL from the individual `PSQL_*` variables.
pub fn database_url_from_parts() -> String {
    format!(
        "postgresql://{}:{}@{}:{}/{}",
        env_string("PSQL_USER", DEFAULT_PSQL_USER),
        env_string("PSQL_PASSWORD", DEFAULT_PSQL_PASSWORD),
        env_string("PSQL_HOST", DEFAULT_PSQL_HOST),
        env_or("PSQL_PORT", DEFAULT_PSQL_PORT),
        env_string("PSQL_DB_NAME", DEFAULT_PSQL_DB_NAME),
    )
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Resolve configuration from the current environment without validating it
    pub fn from_env() -> anyhow::Result<Self> {
        let sweep_mode = match std::env::var("SWEEP_MODE") {
            Ok(mode) => mode.parse()?,
            Err(_) => SweepMode::default(),
        };
        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(backend) => backend.parse()?,
            Err(_) => StoreBackend::default(),
        };
        let fetch_timeout_secs = env_or("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS);

        Ok(Config {
            server: ServerConfig {
                host: env_string("OBJWATCH_HOST", DEFAULT_SERVER_HOST),
                port: env_or("OBJWATCH_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "OBJWATCH_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or_else(|_| database_url_from_parts()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            provider: ProviderConfig {
                base_url: env_string("PROVIDER_URL", DEFAULT_PROVIDER_URL),
                fetch_timeout_secs,
            },
            pipeline: PipelineConfig {
                worker_pool_size: env_or("WORKER_POOL_SIZE", DEFAULT_WORKER_POOL_SIZE),
                admission_queue_capacity: env_or(
                    "ADMISSION_QUEUE_CAPACITY",
                    DEFAULT_ADMISSION_QUEUE_CAPACITY,
                ),
                result_queue_capacity: env_or(
                    "RESULT_QUEUE_CAPACITY",
                    DEFAULT_RESULT_QUEUE_CAPACITY,
                ),
                error_buffer_capacity: env_or(
                    "ERROR_BUFFER_CAPACITY",
                    DEFAULT_ERROR_BUFFER_CAPACITY,
                ),
                fetch_timeout_secs,
                store_timeout_secs: env_or("STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT_SECS),
                retention_ttl_secs: env_or("RETENTION_TTL_SECS", DEFAULT_RETENTION_TTL_SECS),
                sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
                sweep_mode,
                dedup_retention_secs: env_opt("DEDUP_RETENTION_SECS"),
                dedup_max_entries: env_opt("DEDUP_MAX_ENTRIES"),
            },
            store_backend,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.store_backend == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("Database URL cannot be empty");
            }
            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }
            if self.database.min_connections > self.database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    self.database.min_connections,
                    self.database.max_connections
                );
            }
        }

        reqwest::Url::parse(&self.provider.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid PROVIDER_URL '{}': {}", self.provider.base_url, e))?;

        let pipeline = &self.pipeline;
        if pipeline.worker_pool_size == 0 {
            anyhow::bail!("WORKER_POOL_SIZE must be greater than 0");
        }
        if pipeline.admission_queue_capacity == 0 || pipeline.result_queue_capacity == 0 {
            anyhow::bail!("Queue capacities must be greater than 0");
        }
        if pipeline.error_buffer_capacity == 0 {
            anyhow::bail!("ERROR_BUFFER_CAPACITY must be greater than 0");
        }
        if pipeline.fetch_timeout_secs == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }
        if pipeline.sweep_interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than 0");
        }
        if pipeline.dedup_max_entries == Some(0) {
            anyhow::bail!("DEDUP_MAX_ENTRIES must be greater than 0 when set");
        }
        if pipeline.dedup_retention_secs.is_none() && pipeline.dedup_max_entries.is_none() {
            tracing::warn!(
                "Neither DEDUP_RETENTION_SECS nor DEDUP_MAX_ENTRIES is set - the identifier set grows without bound"
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    DEFAULT_PSQL_USER,
                    DEFAULT_PSQL_PASSWORD,
                    DEFAULT_PSQL_HOST,
                    DEFAULT_PSQL_PORT,
                    DEFAULT_PSQL_DB_NAME
                ),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            provider: ProviderConfig {
                base_url: DEFAULT_PROVIDER_URL.to_string(),
                fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            },
            pipeline: PipelineConfig::default(),
            store_backend: StoreBackend::Postgres,
        }
    }
}

//! objwatch Server Library
//!
//! Tracks which remote objects are currently online.
//!
//! # Overview
//!
//! An upstream notifier posts batches of object ids to the ingest callback.
//! Each id passes a dedup gate, is looked up once against the detail
//! provider by a bounded worker pool, and online objects are upserted into
//! the `objects` table. A sweeper evicts rows not refreshed within the
//! retention TTL.
//!
//! - **Pipeline**: admission, workers, filter, persistence sink, sweeper and
//!   error sink, all under one cancellation token
//! - **Database**: PostgreSQL via SQLx, or an in-memory store for development
//! - **API**: axum routes for ingest and inspection
//!
//! # Example
//!
//! ```no_run
//! use objwatch_server::{config::Config, db::InMemoryObjectStore};
//! use objwatch_server::pipeline::{HttpDetailFetcher, Pipeline, Supervisor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let fetcher = Arc::new(HttpDetailFetcher::new(&config.provider)?);
//!     let store = Arc::new(InMemoryObjectStore::new());
//!     let pipeline = Pipeline::start(&config.pipeline, fetcher, store, Supervisor::new());
//!     let report = pipeline.shutdown().await;
//!     println!("{:?}", report.stats);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod pipeline;

// Re-export commonly used types
pub use error::{AppError, AppResult};

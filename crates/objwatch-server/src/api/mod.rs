//! HTTP surface
//!
//! - `POST /callback`: ingest a batch of object ids
//! - `GET /health`, `GET /stats`, `GET /objects`: read-only views
//! - `DELETE /identifiers[/:id]`: release dedup entries for reprocessing

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::db::ObjectStore;
use crate::middleware;
use crate::pipeline::{Admission, IdentifierSet, Pipeline, PipelineStats};

pub mod admin;
pub mod ingest;
pub mod response;

/// Shared handler state, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub admission: Admission,
    pub identifiers: Arc<IdentifierSet>,
    pub stats: Arc<PipelineStats>,
    pub store: Arc<dyn ObjectStore>,
}

impl AppState {
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            admission: pipeline.admission(),
            identifiers: pipeline.identifiers(),
            stats: pipeline.stats(),
            store: pipeline.store(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/callback", post(ingest::callback))
        .route("/health", get(admin::health))
        .route("/stats", get(admin::stats))
        .route("/objects", get(admin::list_objects))
        .route("/identifiers", delete(admin::clear_identifiers))
        .route("/identifiers/:id", delete(admin::forget_identifier))
        .layer(middleware::tracing_layer())
        .with_state(state)
}

/// Serve until `shutdown` fires. In-flight requests are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

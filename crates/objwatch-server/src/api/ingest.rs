//! Ingest callback

use axum::{body::Bytes, extract::State};
use objwatch_common::types::ObjectList;

use super::response::ApiResponse;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline::AdmissionReport;

/// `POST /callback` with `{ "object_ids": [..] }`.
///
/// Malformed payloads are rejected before anything reaches the pipeline.
/// Admission may wait while the worker queue is full.
pub async fn callback(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<ApiResponse<AdmissionReport>> {
    if body.is_empty() {
        return Err(AppError::Decode("empty request body".to_string()));
    }

    let batch = ObjectList::from_json(&body)?;
    tracing::debug!(count = batch.len(), "Received object batch");

    let report = state.admission.submit(&batch.object_ids).await?;
    tracing::info!(
        received = report.received,
        admitted = report.admitted,
        duplicates = report.duplicates,
        "Batch admitted"
    );

    Ok(ApiResponse::accepted(report))
}

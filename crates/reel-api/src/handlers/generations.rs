//! Generation job handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use reel_models::{GenerationId, GenerationJob, GenerationRequest, JobStatus};
use reel_worker::MigrationSummary;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitGenerationResponse {
    pub job_id: GenerationId,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListGenerationsQuery {
    /// Only jobs in this status
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerationListResponse {
    pub generations: Vec<GenerationJob>,
    pub total: usize,
}

/// Accept a generation; provider work continues in the background.
pub async fn submit_generation(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> ApiResult<(StatusCode, Json<SubmitGenerationResponse>)> {
    let job = state.generations.submit(request).await?;
    info!(job_id = %job.id, provider = %job.provider, "Generation accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitGenerationResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

pub async fn list_generations(
    State(state): State<AppState>,
    Query(query): Query<ListGenerationsQuery>,
) -> ApiResult<Json<GenerationListResponse>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<JobStatus>())
        .transpose()
        .map_err(ApiError::bad_request)?;

    let generations = state.generations.list(status).await?;
    Ok(Json(GenerationListResponse {
        total: generations.len(),
        generations,
    }))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationJob>> {
    let job = state.generations.get(&GenerationId::from_string(id)).await?;
    Ok(Json(job))
}

pub async fn cancel_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationJob>> {
    let job = state.generations.cancel(&GenerationId::from_string(id)).await?;
    Ok(Json(job))
}

/// Re-download completed results whose local file is missing.
pub async fn localize_results(State(state): State<AppState>) -> ApiResult<Json<MigrationSummary>> {
    let summary = state.generations.migrate_results().await?;
    info!(
        scanned = summary.scanned,
        localized = summary.localized,
        failed = summary.failed,
        "Result migration finished"
    );
    Ok(Json(summary))
}

//! Merge job handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use reel_models::{JobStatus, MergeId, MergeJob, MergeRequest};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitMergeResponse {
    pub merge_id: MergeId,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct MergeListResponse {
    pub merges: Vec<MergeJob>,
    pub total: usize,
}

pub async fn submit_merge(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<(StatusCode, Json<SubmitMergeResponse>)> {
    let job = state.merges.submit(request).await?;
    info!(merge_id = %job.id, clips = job.clips.len(), "Merge accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitMergeResponse {
            merge_id: job.id,
            status: job.status,
        }),
    ))
}

pub async fn list_merges(State(state): State<AppState>) -> ApiResult<Json<MergeListResponse>> {
    let merges = state.merges.list().await?;
    Ok(Json(MergeListResponse {
        total: merges.len(),
        merges,
    }))
}

pub async fn get_merge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MergeJob>> {
    let job = state.merges.get(&MergeId::from_string(id)).await?;
    Ok(Json(job))
}

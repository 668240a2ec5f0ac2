// rest/routes/video.rs — video generation routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::video::{GenerationOptions, GenerationTask};
use crate::AppContext;

#[derive(Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

/// Start an asynchronous generation job. Answers 202 with the initial task
/// snapshot; the dashboard follows up on the status route.
pub async fn submit_generation(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<GenerationTask>), GatewayError> {
    let task = ctx.video.submit(&body.prompt, &body.options).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

#[derive(Deserialize)]
pub struct StatusParams {
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
}

/// One status check, no waiting. The dashboard drives its own poll loop.
pub async fn generation_status(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<StatusParams>,
) -> Result<Json<GenerationTask>, GatewayError> {
    let task_id = params
        .task_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            GatewayError::InvalidRequest("taskId query parameter is required".to_string())
        })?;
    let task = ctx.video.poll(&task_id).await?;
    Ok(Json(task))
}

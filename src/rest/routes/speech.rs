// rest/routes/speech.rs — speech synthesis and transcription routes.

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::AppContext;

#[derive(Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: Option<String>,
    pub format: Option<String>,
}

/// Turn text into audio. The response body is the raw audio stream with the
/// vendor's content type, so the client can feed it straight to a player.
pub async fn synthesize(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SynthesizeRequest>,
) -> Result<Response, GatewayError> {
    let audio = ctx
        .speech
        .synthesize(&body.text, body.voice.as_deref(), body.format.as_deref())
        .await?;
    Ok(([(header::CONTENT_TYPE, audio.content_type)], audio.bytes).into_response())
}

/// Accepts raw PCM (or WAV, whose header is stripped) and returns the
/// recognized text.
pub async fn transcribe(
    State(ctx): State<Arc<AppContext>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let result = ctx.speech.transcribe(&body).await?;
    Ok(Json(json!({
        "text": result.text,
        "taskId": result.task_id,
    })))
}

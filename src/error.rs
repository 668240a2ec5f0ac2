//! Gateway error taxonomy.
//!
//! Every failure that can cross the HTTP boundary is a [`GatewayError`]. The
//! single `IntoResponse` impl turns each variant into a structured JSON body,
//! so route handlers bubble errors with `?` and nothing is swallowed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced by the gateway's vendor clients and route handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request signing failed. Signing is pure, so this is a caller bug
    /// (malformed parameters), not an upstream condition.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// The token-issuing endpoint failed or returned an incomplete payload.
    /// Nothing is cached; the next call retries issuance.
    #[error("vendor token issuance failed: {0}")]
    AuthToken(String),

    /// A generation job could not be started. Carries the upstream status and
    /// raw body for diagnostics. Never retried here; retry policy belongs to
    /// the caller.
    #[error("job submission failed (upstream status {status}): {body}")]
    SubmissionFailed { status: u16, body: String },

    /// The vendor explicitly reported failure: a failed generation task, a
    /// rejected translation, a speech error payload. Message passed through.
    #[error("upstream reported failure: {message}")]
    UpstreamFailed { message: String },

    /// The polling budget ran out before the task reached a terminal state.
    /// Distinct from [`GatewayError::UpstreamFailed`]: the vendor never said
    /// "failed", we stopped waiting.
    #[error("task {task_id} reached no terminal state after {attempts} polls")]
    PollTimeout { task_id: String, attempts: u32 },

    /// A vendor response did not match the documented shape. Raised by the
    /// decode step instead of silently producing empty fields.
    #[error("unexpected {context} payload from vendor: {detail}")]
    UnexpectedPayload {
        context: &'static str,
        detail: String,
    },

    /// Connection, TLS, or timeout failure talking to the vendor.
    #[error("vendor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The caller's request was malformed (missing taskId, empty prompt, …).
    #[error("{0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// HTTP status this variant maps to at the route boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::AuthToken(_)
            | GatewayError::SubmissionFailed { .. }
            | GatewayError::UpstreamFailed { .. }
            | GatewayError::UnexpectedPayload { .. }
            | GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({ "error": self.to_string() });
        // Keep the upstream status addressable without string-parsing.
        if let GatewayError::SubmissionFailed {
            status: upstream, ..
        } = &self
        {
            body["upstreamStatus"] = json!(upstream);
        }
        (status, Json(body)).into_response()
    }
}

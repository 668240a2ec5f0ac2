use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Liveness, plus which vendor credentials are still unset. The gateway boots
/// without credentials, so the dashboard uses this to point at broken setup
/// before a vendor route fails.
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "missingCredentials": ctx.config.missing_credentials(),
    }))
}

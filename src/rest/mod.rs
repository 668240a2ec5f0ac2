// rest/mod.rs — HTTP API for the study-planner dashboard.
//
// Axum server bridging dashboard calls to the vendor clients.
//
// Endpoints:
//   POST /api/v1/video/generations
//   GET  /api/v1/video/generations/status?taskId=...
//   POST /api/v1/translate
//   POST /api/v1/speech/synthesize
//   POST /api/v1/speech/transcribe
//   GET  /api/v1/health

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::AppContext;

pub async fn start_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("gateway listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    // The dashboard may be served from another origin during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route(
            "/api/v1/video/generations",
            post(routes::video::submit_generation),
        )
        .route(
            "/api/v1/video/generations/status",
            get(routes::video::generation_status),
        )
        .route("/api/v1/translate", post(routes::translate::translate))
        .route("/api/v1/speech/synthesize", post(routes::speech::synthesize))
        .route("/api/v1/speech/transcribe", post(routes::speech::transcribe))
        .layer(cors)
        .with_state(ctx)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

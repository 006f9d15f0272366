//! Router and process-level plumbing around the telemetry streams.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::Path;
use tower_http::services::ServeDir;
use tracing::warn;

use crate::sse::events_handler;
use crate::state::AppState;

pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/events", get(events_handler))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

async fn index_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(&state.template).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!("dashboard template {}: {e}", state.template.display());
            (StatusCode::NOT_FOUND, "dashboard template not found").into_response()
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

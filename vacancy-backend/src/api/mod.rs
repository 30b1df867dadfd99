use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

mod events;
mod items;
mod submit;

use crate::state::AppState;

/// Axum REST API routes.
///
///   GET    /view                              -> current rendered view (buckets + cards)
///   POST   /render                            -> run a render pass now
///   POST   /items/:itemId/actions             -> vote / applied / not_interested / exam_done
///   DELETE /items/:itemId/pending/:category   -> cancel an open commit window (undo)
///   GET    /pending                           -> open commit windows with countdowns
///   POST   /reports                           -> report a listing as wrong
///   POST   /missing                           -> suggest a missing listing
///   GET    /events                            -> SSE stream of engine events and renders
///   GET    /status                            -> health check
///   GET    /logs                              -> recent backend log entries
///   GET    /logs/stream                       -> SSE stream of new log entries
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/view", get(items::get_view))
        .route("/render", post(items::render_now))
        .route("/items/{item_id}/actions", post(items::perform_action))
        .route(
            "/items/{item_id}/pending/{category}",
            delete(items::cancel_pending),
        )
        .route("/pending", get(items::list_pending))
        .route("/reports", post(submit::submit_report))
        .route("/missing", post(submit::submit_missing))
        .route("/events", get(events::sse_events))
        .route("/status", get(events::status))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, target: &'static str, error: String) -> ApiError {
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

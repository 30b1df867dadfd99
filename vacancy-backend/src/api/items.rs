use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use vacancy_core::action::PendingView;
use vacancy_core::render::PassOutcome;
use vacancy_core::{ActionKind, ActionOutcome, ActionRequest, Category, RenderedView};

use super::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    kind: ActionKind,
    #[serde(default)]
    url: Option<String>,
    /// Answer to the confirmation prompt for applied / not_interested.
    #[serde(default)]
    confirmed: bool,
}

pub async fn get_view(State(state): State<AppState>) -> Json<RenderedView> {
    Json(state.renderer.view().as_ref().clone())
}

pub async fn render_now(State(state): State<AppState>) -> Json<serde_json::Value> {
    let outcome = state.renderer.render().await;
    let (generation, published) = match outcome {
        PassOutcome::Published(token) => (token.value(), true),
        PassOutcome::Stale(token) => (token.value(), false),
    };
    Json(serde_json::json!({
        "generation": generation,
        "published": published,
    }))
}

pub async fn perform_action(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(body): Json<ActionBody>,
) -> Result<(StatusCode, Json<ActionOutcome>), ApiError> {
    let item_id = item_id.trim().to_string();
    let request = ActionRequest {
        item_id,
        kind: body.kind,
        url: body.url,
    };
    match state.engine.perform_action(request, &body.confirmed).await {
        outcome @ ActionOutcome::Pending(_) => Ok((StatusCode::ACCEPTED, Json(outcome))),
        outcome @ ActionOutcome::Declined => Ok((StatusCode::OK, Json(outcome))),
        ActionOutcome::Ignored => Err(api_error(
            StatusCode::BAD_REQUEST,
            "vacancy.api.action",
            "Action needs an item id".to_string(),
        )),
    }
}

pub async fn cancel_pending(
    State(state): State<AppState>,
    Path((item_id, category)): Path<(String, Category)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.engine.cancel(&item_id, category).await {
        Ok(Json(serde_json::json!({ "cancelled": true })))
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            "vacancy.api.cancel",
            format!("No pending {:?} window on {}", category, item_id),
        ))
    }
}

pub async fn list_pending(State(state): State<AppState>) -> Json<Vec<PendingView>> {
    Json(state.engine.pending_windows())
}

use axum::{
    extract::State,
    response::{sse::Event, Json, Sse},
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream, WatchStream};
use tokio_stream::StreamExt;
use vacancy_core::store::LoadOutcome;
use vacancy_core::RenderedView;

use crate::state::AppState;

/// SSE endpoint: engine events (windows, ticks, commits, reverts, notifications) plus a
/// `render_completed` event whenever a new view is published.
pub async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let engine_events = BroadcastStream::new(state.engine.subscribe()).filter_map(|result| {
        let event = result.ok()?;
        let json = serde_json::to_string(&event).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    let renders = WatchStream::from_changes(state.renderer.subscribe()).filter_map(|view| {
        let generation = match view.as_ref() {
            RenderedView::Ready { generation, .. } | RenderedView::Unavailable { generation, .. } => {
                *generation
            }
            RenderedView::Loading => return None,
        };
        let json = serde_json::json!({ "type": "render_completed", "generation": generation });
        Some(Ok(Event::default().data(json.to_string())))
    });

    // Keep-alive every 30 seconds
    let keep_alive = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keep-alive")));

    Sse::new(engine_events.merge(renders).merge(keep_alive))
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let replica = match state.load_outcome {
        LoadOutcome::Merged {
            remote_wins,
            remote_only,
        } => serde_json::json!({
            "source": "remote",
            "remoteWins": remote_wins,
            "remoteOnly": remote_only,
        }),
        LoadOutcome::Fallback { snapshot_states } => serde_json::json!({
            "source": "snapshot",
            "snapshotStates": snapshot_states,
        }),
        LoadOutcome::LocalOnly => serde_json::json!({ "source": "local" }),
    };
    Json(serde_json::json!({
        "status": "running",
        "port": state.port,
        "bind_address": state.bind_address,
        "replica": replica,
        "generation": state.renderer.generation(),
        "pending": state.engine.pending_windows().len(),
        "undoWindowSecs": state.engine.window_secs(),
    }))
}

pub async fn list_logs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "entries": crate::log_bridge::recent_entries(),
        "filePath": crate::log_bridge::log_file_path(),
    }))
}

pub async fn stream_logs() -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(crate::log_bridge::subscribe()).filter_map(|item| {
        let entry = item.ok()?;
        let payload = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(payload)))
    });
    Sse::new(stream)
}

use axum::{extract::State, http::StatusCode, response::Json};
use vacancy_core::submission::{MissingSubmission, ReportSubmission, SubmissionError};
use vacancy_core::sync::GatewayError;
use vacancy_core::PushEvent;

use super::{api_error, ApiError};
use crate::state::AppState;

pub async fn submit_report(
    State(state): State<AppState>,
    Json(body): Json<ReportSubmission>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = body
        .validated(state.engine.store().now())
        .map_err(|e| invalid("vacancy.api.report", e))?;
    forward(&state, PushEvent::Report(report), "vacancy.api.report").await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "Report submitted" })))
}

pub async fn submit_missing(
    State(state): State<AppState>,
    Json(body): Json<MissingSubmission>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let missing = body
        .validated(state.engine.store().now())
        .map_err(|e| invalid("vacancy.api.missing", e))?;
    forward(&state, PushEvent::Missing(missing), "vacancy.api.missing").await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "Submission received" })))
}

fn invalid(target: &'static str, e: SubmissionError) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, target, e.to_string())
}

async fn forward(state: &AppState, event: PushEvent, target: &'static str) -> Result<(), ApiError> {
    state.gateway.push(&event).await.map_err(|e| {
        let status = match e {
            GatewayError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        };
        api_error(status, target, format!("{} failed: {}", event.kind(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::open_session;
    use serde_json::json;

    fn report(body: serde_json::Value) -> Json<ReportSubmission> {
        Json(serde_json::from_value(body).unwrap())
    }

    #[tokio::test]
    async fn test_report_without_reason_never_reaches_remote() {
        let (session, gateway, _replica) = open_session(false).await;
        let err = submit_report(State(session.state().clone()), report(json!({"jobId": "J1"})))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(gateway.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_is_trimmed_and_forwarded() {
        let (session, gateway, _replica) = open_session(false).await;
        submit_report(
            State(session.state().clone()),
            report(json!({"jobId": " J1 ", "reasonCode": "closed "})),
        )
        .await
        .unwrap();

        let pushes = gateway.pushes.lock().unwrap().clone();
        assert_eq!(pushes[0]["type"], "report");
        assert_eq!(pushes[0]["jobId"], "J1");
        assert_eq!(pushes[0]["reasonCode"], "closed");
    }

    #[tokio::test]
    async fn test_missing_requires_title_and_url() {
        let (session, gateway, _replica) = open_session(false).await;
        let body: MissingSubmission = serde_json::from_value(json!({"title": "Clerk"})).unwrap();
        let err = submit_missing(State(session.state().clone()), Json(body))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.error.contains("url"));
        assert!(gateway.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submission_surfaces_error() {
        let (session, _gateway, _replica) = open_session(true).await;
        let body: MissingSubmission =
            serde_json::from_value(json!({"title": "Clerk", "url": "https://x.org"})).unwrap();
        let err = submit_missing(State(session.state().clone()), Json(body))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

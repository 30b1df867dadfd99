/// Sync gateway contract and the wire messages exchanged with the remote replica.
///
/// Protocol:
///   `GET <endpoint>?state=1` returns `{ ok, votes: { id: VoteRecord }, state: { id: StateRecord } }`.
///   When that fails, a read-only legacy snapshot (`{ id: StateRecord }`) may stand in for states.
///   `POST <endpoint>` carries one tagged `PushEvent`; the reply is `{ ok, error? }`.
///
/// Every call is best-effort. Callers log failures and carry on with local data.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::submission::{MissingSubmission, ReportSubmission};
use crate::types::{decode_records, StateAction, StateMap, Timestamp, Vote, VoteMap};

/// Vote events understood by the remote replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteEvent {
    Right,
    Wrong,
    UndoRight,
    UndoWrong,
}

impl VoteEvent {
    pub fn forward(vote: Vote) -> Self {
        match vote {
            Vote::Right => VoteEvent::Right,
            Vote::Wrong => VoteEvent::Wrong,
        }
    }

    pub fn inverse(vote: Vote) -> Self {
        match vote {
            Vote::Right => VoteEvent::UndoRight,
            Vote::Wrong => VoteEvent::UndoWrong,
        }
    }
}

/// State actions as they appear in a push, including the `undo` retraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateEventAction {
    Applied,
    NotInterested,
    ExamDone,
    Undo,
}

impl From<StateAction> for StateEventAction {
    fn from(action: StateAction) -> Self {
        match action {
            StateAction::Applied => StateEventAction::Applied,
            StateAction::NotInterested => StateEventAction::NotInterested,
            StateAction::ExamDone => StateEventAction::ExamDone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub action: StateEventAction,
    pub ts: Timestamp,
}

/// Messages pushed to the remote replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// Whole state map, sent on session teardown.
    UserStateSync { payload: Value, ts: Timestamp },
    Vote {
        vote: VoteEvent,
        #[serde(rename = "jobId")]
        job_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        ts: Timestamp,
    },
    State { payload: StatePayload },
    Report(ReportSubmission),
    Missing(MissingSubmission),
}

impl PushEvent {
    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::UserStateSync { .. } => "user_state_sync",
            PushEvent::Vote { .. } => "vote",
            PushEvent::State { .. } => "state",
            PushEvent::Report(_) => "report",
            PushEvent::Missing(_) => "missing",
        }
    }
}

/// Both record kinds as last seen on the remote replica.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    pub votes: VoteMap,
    pub states: StateMap,
}

impl RemoteSnapshot {
    /// Decode a combined fetch response. `ok: false` (or no `ok`) is a rejection;
    /// malformed `votes` / `state` members decode as empty maps.
    pub fn from_response(value: &Value) -> Result<Self, GatewayError> {
        if !value.is_object() {
            return Err(GatewayError::Malformed("response is not an object".into()));
        }
        if value.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(GatewayError::Rejected(response_error(value)));
        }
        Ok(Self {
            votes: value.get("votes").map(decode_records).unwrap_or_default(),
            states: value.get("state").map(decode_records).unwrap_or_default(),
        })
    }
}

/// Check a `{ ok, error? }` push acknowledgement.
pub fn check_push_response(value: &Value) -> Result<(), GatewayError> {
    if value.get("ok").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(GatewayError::Rejected(response_error(value)))
    }
}

fn response_error(value: &Value) -> String {
    value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Network side of the remote replica.
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// Combined fetch of votes and states.
    async fn fetch_remote(&self) -> Result<RemoteSnapshot, GatewayError>;

    /// Legacy read-only snapshot. Only ever supplies states.
    async fn fetch_fallback_states(&self) -> Result<StateMap, GatewayError>;

    /// Push one event. Not retried by callers.
    async fn push(&self, event: &PushEvent) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> Timestamp {
        Timestamp::parse_lenient("2025-11-01T10:00:00Z")
    }

    #[test]
    fn test_vote_push_wire_shape() {
        let event = PushEvent::Vote {
            vote: VoteEvent::UndoRight,
            job_id: "J1".into(),
            url: None,
            ts: ts(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "vote",
                "vote": "undo_right",
                "jobId": "J1",
                "ts": "2025-11-01T10:00:00.000Z",
            })
        );
    }

    #[test]
    fn test_state_push_wire_shape() {
        let event = PushEvent::State {
            payload: StatePayload {
                job_id: "J1".into(),
                action: StateEventAction::Undo,
                ts: ts(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["payload"]["jobId"], "J1");
        assert_eq!(value["payload"]["action"], "undo");
    }

    #[test]
    fn test_user_state_sync_wire_shape() {
        let event = PushEvent::UserStateSync {
            payload: json!({ "J1": { "action": "applied", "ts": "x" } }),
            ts: ts(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user_state_sync");
        assert_eq!(value["payload"]["J1"]["action"], "applied");
    }

    #[test]
    fn test_snapshot_requires_ok() {
        let err = RemoteSnapshot::from_response(&json!({ "ok": false, "error": "kv down" }));
        assert!(matches!(err, Err(GatewayError::Rejected(msg)) if msg == "kv down"));
        assert!(matches!(
            RemoteSnapshot::from_response(&json!("hello")),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn test_snapshot_tolerates_bad_members() {
        let snapshot = RemoteSnapshot::from_response(&json!({
            "ok": true,
            "votes": "nope",
            "state": { "J1": { "action": "applied", "ts": "2025-11-01T10:00:00Z" } },
        }))
        .unwrap();
        assert!(snapshot.votes.is_empty());
        assert_eq!(snapshot.states["J1"].value(), Some(StateAction::Applied));
    }

    #[test]
    fn test_check_push_response() {
        assert!(check_push_response(&json!({ "ok": true })).is_ok());
        assert!(matches!(
            check_push_response(&json!({ "ok": false })),
            Err(GatewayError::Rejected(msg)) if msg == "unknown"
        ));
    }
}

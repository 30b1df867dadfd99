//! In-process test doubles for the network collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::sync::{GatewayError, PushEvent, RemoteSnapshot, SyncGateway};
use crate::types::{decode_records, StateMap};

/// Gateway that answers from canned JSON and records every push.
#[derive(Clone, Default)]
pub struct FakeGateway {
    remote: Option<Value>,
    fallback: Option<Value>,
    fail_pushes: bool,
    pushes: Arc<Mutex<Vec<PushEvent>>>,
}

impl FakeGateway {
    pub fn with_remote(response: Value) -> Self {
        Self {
            remote: Some(response),
            ..Self::default()
        }
    }

    /// Combined fetch fails; no fallback unless added.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, snapshot: Value) -> Self {
        self.fallback = Some(snapshot);
        self
    }

    pub fn rejecting_pushes(mut self) -> Self {
        self.fail_pushes = true;
        self
    }

    pub fn pushes(&self) -> Vec<PushEvent> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn push_json(&self) -> Vec<Value> {
        self.pushes()
            .iter()
            .map(|p| serde_json::to_value(p).unwrap())
            .collect()
    }
}

#[async_trait]
impl SyncGateway for FakeGateway {
    async fn fetch_remote(&self) -> Result<RemoteSnapshot, GatewayError> {
        match &self.remote {
            Some(value) => RemoteSnapshot::from_response(value),
            None => Err(GatewayError::Transport("connection refused".into())),
        }
    }

    async fn fetch_fallback_states(&self) -> Result<StateMap, GatewayError> {
        match &self.fallback {
            Some(value) => Ok(decode_records(value)),
            None => Err(GatewayError::Status(404)),
        }
    }

    async fn push(&self, event: &PushEvent) -> Result<(), GatewayError> {
        // Recorded even when rejected: the attempt is what callers control.
        self.pushes.lock().unwrap().push(event.clone());
        if self.fail_pushes {
            return Err(GatewayError::Transport("offline".into()));
        }
        Ok(())
    }
}

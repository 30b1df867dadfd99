/// HTTP side of the remote replica.
///
///   GET  <endpoint>?state=1   -> { ok, votes, state }
///   GET  <snapshot_url>       -> legacy state map (fallback only)
///   POST <endpoint>           -> tagged push body, answered with { ok, error? }
use async_trait::async_trait;
use serde_json::Value;
use vacancy_core::sync::{check_push_response, GatewayError, PushEvent, RemoteSnapshot, SyncGateway};
use vacancy_core::types::{decode_records, StateMap};

pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    snapshot_url: Option<String>,
}

impl HttpGateway {
    pub fn new(client: reqwest::Client, endpoint: &str, snapshot_url: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            snapshot_url,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        resp.json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

/// Submissions are only done once the remote acknowledges them; vote and state pushes are
/// fire-and-forget beyond the HTTP status.
fn needs_ack(event: &PushEvent) -> bool {
    matches!(event, PushEvent::Report(_) | PushEvent::Missing(_))
}

#[async_trait]
impl SyncGateway for HttpGateway {
    async fn fetch_remote(&self) -> Result<RemoteSnapshot, GatewayError> {
        let body = self.get_json(&format!("{}?state=1", self.endpoint)).await?;
        RemoteSnapshot::from_response(&body)
    }

    async fn fetch_fallback_states(&self) -> Result<StateMap, GatewayError> {
        let Some(url) = &self.snapshot_url else {
            return Err(GatewayError::Transport("no snapshot url configured".into()));
        };
        let body = self.get_json(&cache_busted(url)).await?;
        if !body.is_object() {
            return Err(GatewayError::Malformed("snapshot is not an object".into()));
        }
        Ok(decode_records(&body))
    }

    async fn push(&self, event: &PushEvent) -> Result<(), GatewayError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = resp.status();
        let body: Option<Value> = resp.json().await.ok();

        if !status.is_success() {
            if let Some(body) = &body {
                check_push_response(body)?;
            }
            return Err(GatewayError::Status(status.as_u16()));
        }
        if needs_ack(event) {
            return match &body {
                Some(body) => check_push_response(body),
                None => Err(GatewayError::Malformed("push response is not JSON".into())),
            };
        }
        Ok(())
    }
}

/// Append a `t=<millis>` query so intermediaries never serve a cached copy.
pub fn cache_busted(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, sep, chrono::Utc::now().timestamp_millis())
}

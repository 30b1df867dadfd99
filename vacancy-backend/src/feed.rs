/// Item feed over HTTP. Fetched once per render pass, cache-busted.
use async_trait::async_trait;
use serde_json::Value;
use vacancy_core::render::{FeedError, ItemFeed};
use vacancy_core::types::FeedDocument;

use crate::gateway::cache_busted;

pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ItemFeed for HttpFeed {
    async fn fetch(&self) -> Result<FeedDocument, FeedError> {
        let resp = self
            .client
            .get(cache_busted(&self.url))
            .header("Cache-Control", "no-store")
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FeedError::Status(resp.status().as_u16()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;
        FeedDocument::from_json(&body)
            .ok_or_else(|| FeedError::Malformed("missing jobListings array".into()))
    }
}

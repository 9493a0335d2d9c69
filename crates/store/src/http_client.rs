//! Record store client over the gateway's REST API.
//!
//! Issues `GET|POST|PUT|DELETE {base}/api/{collection}[?id=..]`. A 404 is a
//! normal "not found" answer; anything else unexpected is a [`StoreError`].

use async_trait::async_trait;
use clinicdesk_core::error::StoreError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use reqwest::StatusCode;
use tracing::debug;

pub struct HttpRecordStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRecordStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, kind: ResourceKind) -> String {
        format!("{}/api/{}", self.base_url, kind.collection())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }
}

async fn unexpected(response: reqwest::Response) -> StoreError {
    let status_code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or(body);
    StoreError::Status {
        status_code,
        message,
    }
}

async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    response
        .json()
        .await
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        let response = self.send(self.client.get(self.url(kind))).await?;
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }
        json_body(response).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Resource>, StoreError> {
        let response = self
            .send(self.client.get(self.url(kind)).query(&[("id", id)]))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => json_body(response).await.map(Some),
            _ => Err(unexpected(response).await),
        }
    }

    async fn create(&self, kind: ResourceKind, partial: Resource) -> Result<Resource, StoreError> {
        debug!(kind = %kind, "POST record");
        let response = self
            .send(self.client.post(self.url(kind)).json(&partial))
            .await?;
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }
        json_body(response).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        partial: Resource,
    ) -> Result<Option<Resource>, StoreError> {
        debug!(kind = %kind, id, "PUT record");
        let response = self
            .send(
                self.client
                    .put(self.url(kind))
                    .query(&[("id", id)])
                    .json(&partial),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => json_body(response).await.map(Some),
            _ => Err(unexpected(response).await),
        }
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        debug!(kind = %kind, id, "DELETE record");
        let response = self
            .send(self.client.delete(self.url(kind)).query(&[("id", id)]))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(unexpected(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_use_collection_names() {
        let store = HttpRecordStore::new("http://localhost:3000/");
        assert_eq!(
            store.url(ResourceKind::MedicationRequests),
            "http://localhost:3000/api/medication-requests"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let store = HttpRecordStore::new("http://127.0.0.1:9");
        let err = store.list(ResourceKind::Patients).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}

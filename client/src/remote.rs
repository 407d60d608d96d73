//! Remote service seam.
//!
//! The dispatcher only needs one call per intent and a three-way answer
//! (success, conflict, failure). [`HttpRemote`] maps intents onto the
//! hospital REST API.

use async_trait::async_trait;
use clinisync_engine::{unwrap_envelope, CollectionMap, OperationKind, RemoteOutcome, SyncQueueItem};

use crate::error::{Result, SyncError};

/// Talks to the record server.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Send one intent.
    ///
    /// Never returns an error: transport problems are reported as
    /// [`RemoteOutcome::Failure`] so they count against the attempt budget.
    async fn send(&self, item: &SyncQueueItem) -> RemoteOutcome;

    /// Every record the server holds for a collection.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<serde_json::Value>>;
}

/// REST client for the record API.
///
/// - list: `GET <api>/<endpoint>`
/// - create: `POST <api>/<endpoint>`
/// - update: `PUT <api>/<endpoint>/<id>`
/// - delete: `DELETE <api>/<endpoint>/<id>`
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
    collections: CollectionMap,
}

impl HttpRemote {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        auth_token: Option<String>,
        collections: CollectionMap,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth_token,
            collections,
        }
    }

    /// URL an intent is sent to.
    pub fn url_for(&self, item: &SyncQueueItem) -> String {
        let endpoint = self.collections.endpoint_for(&item.collection);
        match item.operation {
            OperationKind::Create => format!("{}/{}", self.api_url, endpoint),
            OperationKind::Update | OperationKind::Delete => {
                format!("{}/{}/{}", self.api_url, endpoint, item.entity_id)
            }
        }
    }

    fn request(&self, item: &SyncQueueItem) -> reqwest::RequestBuilder {
        let url = self.url_for(item);
        let body = item.payload.as_ref().unwrap_or(&serde_json::Value::Null);

        let request = match item.operation {
            OperationKind::Create => self.client.post(url).json(body),
            OperationKind::Update => self.client.put(url).json(body),
            OperationKind::Delete => self.client.delete(url),
        };
        self.authorize(request)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn send(&self, item: &SyncQueueItem) -> RemoteOutcome {
        let response = match self.request(item).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    queue_id = item.queue_id,
                    error = %e,
                    "Remote call failed before a response"
                );
                return RemoteOutcome::failure(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text)
                .ok()
                .map(unwrap_envelope),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(queue_id = item.queue_id, error = %e, "Unreadable response body");
                None
            }
        };

        tracing::debug!(
            queue_id = item.queue_id,
            operation = %item.operation,
            status,
            "Remote responded"
        );
        RemoteOutcome::from_status(status, body)
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/{}", self.api_url, self.collections.endpoint_for(collection));
        let response = self.authorize(self.client.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteStatus(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        match unwrap_envelope(body) {
            serde_json::Value::Array(items) => {
                tracing::debug!(collection, count = items.len(), "Fetched collection");
                Ok(items)
            }
            other => Err(SyncError::UnexpectedResponse(format!(
                "expected a list for {collection}, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinisync_engine::{NewQueueItem, Priority};
    use serde_json::json;

    fn remote() -> HttpRemote {
        HttpRemote::new(
            reqwest::Client::new(),
            "http://localhost:5000/api/",
            None,
            CollectionMap::hospital_defaults(),
        )
    }

    fn item(operation: OperationKind, collection: &str) -> SyncQueueItem {
        SyncQueueItem::from_new(
            1,
            NewQueueItem::new(
                operation,
                collection,
                "n-1",
                Some(json!({})),
                Priority::Normal,
                0,
            ),
        )
    }

    #[test]
    fn urls_follow_endpoint_map() {
        let remote = remote();
        assert_eq!(
            remote.url_for(&item(OperationKind::Create, "clinicalNotes")),
            "http://localhost:5000/api/notes"
        );
        assert_eq!(
            remote.url_for(&item(OperationKind::Update, "labOrders")),
            "http://localhost:5000/api/lab-orders/n-1"
        );
        assert_eq!(
            remote.url_for(&item(OperationKind::Delete, "wards")),
            "http://localhost:5000/api/wards/n-1"
        );
    }
}

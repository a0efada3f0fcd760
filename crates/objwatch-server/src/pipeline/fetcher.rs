//! Detail fetcher
//!
//! One remote lookup per object id against the detail provider:
//! `POST {provider}/objects/{id}` answering `{ "id", "online", "lastSeen"? }`.

use async_trait::async_trait;
use chrono::Utc;
use objwatch_common::types::{ObjectDetail, ObjectId};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("undecodable provider response: {0}")]
    Decode(String),
}

/// Resolves the current status of one object.
///
/// Implementations stamp `last_seen` with their own completion time.
#[async_trait]
pub trait DetailFetcher: Send + Sync + 'static {
    async fn fetch_detail(&self, id: ObjectId) -> Result<ObjectDetail, FetchError>;
}

/// Provider response body. `lastSeen` may be present but is never trusted.
#[derive(Debug, Deserialize)]
struct ProviderDetail {
    id: i64,
    online: bool,
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpDetailFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDetailFetcher {
    pub fn new(config: &ProviderConfig) -> reqwest::Result<Self> {
        let timeout = config.fetch_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, id: ObjectId) -> String {
        format!("{}/objects/{}", self.base_url, id)
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn fetch_detail(&self, id: ObjectId) -> Result<ObjectDetail, FetchError> {
        let response = self
            .client
            .post(self.endpoint(id))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: ProviderDetail = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Decode(e.to_string())
            }
        })?;

        if body.id != id.get() {
            tracing::debug!(
                object_id = %id,
                reported_id = body.id,
                "Provider echoed a different id, keeping the requested one"
            );
        }

        Ok(ObjectDetail::seen_at(id, body.online, Utc::now()))
    }
}

impl HttpDetailFetcher {
    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Unreachable(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, timeout_secs: u64) -> HttpDetailFetcher {
        HttpDetailFetcher::new(&ProviderConfig {
            base_url: format!("{}/", server.uri()),
            fetch_timeout_secs: timeout_secs,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_online_detail_ignores_provider_timestamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/objects/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "online": true,
                "lastSeen": "1999-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now();
        let detail = fetcher_for(&server, 5)
            .fetch_detail(ObjectId::new(1))
            .await
            .unwrap();

        assert_eq!(detail.id, ObjectId::new(1));
        assert!(detail.online);
        assert!(detail.last_seen >= before);
    }

    #[tokio::test]
    async fn test_fetch_without_last_seen() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/objects/2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 2, "online": false })),
            )
            .mount(&server)
            .await;

        let detail = fetcher_for(&server, 5)
            .fetch_detail(ObjectId::new(2))
            .await
            .unwrap();
        assert!(!detail.online);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 5)
            .fetch_detail(ObjectId::new(3))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(503)));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 5)
            .fetch_detail(ObjectId::new(4))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 5, "online": true }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 1)
            .fetch_detail(ObjectId::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let fetcher = HttpDetailFetcher::new(&ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            fetch_timeout_secs: 2,
        })
        .unwrap();

        let err = fetcher.fetch_detail(ObjectId::new(6)).await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable(_) | FetchError::Timeout(_)));
    }
}

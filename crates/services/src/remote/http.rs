use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{ResultRecord, SessionId, StatsDelta, UserId};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::RemoteResultStore;
use crate::error::RemoteError;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Clone, Debug)]
pub struct HttpRemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpRemoteConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// JSON-over-HTTP binding of the remote result store.
///
/// `POST {base}/users/{user}/history` and `POST {base}/users/{user}/stats`,
/// each carrying an `Idempotency-Key` header. A `409 Conflict` means the key
/// was already applied and counts as success.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    config: HttpRemoteConfig,
}

impl HttpRemoteStore {
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be built.
    pub fn new(config: HttpRemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, user_id: UserId, resource: &str) -> String {
        format!(
            "{}/users/{user_id}/{resource}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: String,
        key: SessionId,
        body: &T,
    ) -> Result<(), RemoteError> {
        let mut request = self
            .client
            .post(url)
            .header(IDEMPOTENCY_HEADER, key.to_string())
            .json(body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        match classify(response.status()) {
            Err(RemoteError::Rejected(reason)) => {
                let body = response.text().await.unwrap_or_default();
                Err(RemoteError::Rejected(format!("{reason}: {body}")))
            }
            outcome => outcome,
        }
    }
}

/// Map a response status onto the store contract.
///
/// `409 Conflict` means the idempotency key was already applied. Other 4xx
/// codes except `429` are permanent; everything else may be retried.
fn classify(status: StatusCode) -> Result<(), RemoteError> {
    if status.is_success() || status == StatusCode::CONFLICT {
        return Ok(());
    }
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::Rejected(status.to_string()));
    }
    Err(RemoteError::HttpStatus(status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRequest<'a> {
    user_id: UserId,
    record: &'a ResultRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsRequest {
    user_id: UserId,
    tests_taken: u32,
    total_score: u32,
    total_time: u32,
    highest_score_candidate: u32,
}

#[async_trait]
impl RemoteResultStore for HttpRemoteStore {
    async fn append_history(
        &self,
        user_id: UserId,
        key: SessionId,
        record: &ResultRecord,
    ) -> Result<(), RemoteError> {
        let body = HistoryRequest { user_id, record };
        self.post(self.url(user_id, "history"), key, &body).await
    }

    async fn update_stats(
        &self,
        user_id: UserId,
        key: SessionId,
        delta: StatsDelta,
    ) -> Result<(), RemoteError> {
        let body = StatsRequest {
            user_id,
            tests_taken: delta.tests_taken,
            total_score: delta.score,
            total_time: delta.time_taken_seconds,
            highest_score_candidate: delta.score,
        };
        self.post(self.url(user_id, "stats"), key, &body).await
    }
}

//! HTTP backend for a hosted account/content/evaluation service.
//!
//! One client implements all four collaborator traits against a REST
//! surface. Status observation is poll-based underneath; the engine only
//! ever sees the stream contract.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use proctor_core::error::StoreError;
use proctor_core::model::{EntitlementTier, EvaluationReport, Submission, TestKind};
use proctor_core::traits::{
    AccountService, EvaluationQueue, QuotaSnapshot, RawStatusStream, SubmissionStore, TopicSource,
};

use crate::error::BackendError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Client for the hosted proctor backend.
pub struct RemoteBackend {
    base_url: String,
    api_token: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client,
        }
    }

    /// Interval between status polls while observing an evaluation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await
    }

    async fn send_json<T: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response).await
    }
}

fn request_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(DEFAULT_TIMEOUT_SECS)
    } else {
        BackendError::NetworkError(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(BackendError::AuthenticationFailed(message));
    }
    Err(BackendError::ApiError {
        status: status.as_u16(),
        message,
    })
}

fn store_error(e: BackendError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[derive(Deserialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct QuotaResponse {
    tier: EntitlementTier,
    used: u32,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct CompletedResponse {
    completed: Vec<TestKind>,
}

#[derive(Serialize)]
struct UsageRequest {
    kind: TestKind,
    submission_id: Uuid,
}

#[derive(Serialize)]
struct CompletionRequest {
    kind: TestKind,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[async_trait]
impl TopicSource for RemoteBackend {
    #[instrument(skip(self))]
    async fn fetch_choices(&self, kind: TestKind, count: usize) -> anyhow::Result<Vec<String>> {
        let response = self
            .get(&format!("/v1/topics?kind={kind}&count={count}"))
            .await?;
        let body: TopicsResponse = response.json().await?;
        Ok(body.topics)
    }
}

#[async_trait]
impl AccountService for RemoteBackend {
    async fn quota(&self, user_id: &str, kind: TestKind) -> anyhow::Result<QuotaSnapshot> {
        let response = self
            .get(&format!("/v1/accounts/{user_id}/quota?kind={kind}"))
            .await?;
        let body: QuotaResponse = response.json().await?;
        Ok(QuotaSnapshot {
            tier: body.tier,
            used: body.used,
            limit: body.limit,
        })
    }

    async fn completed(&self, user_id: &str) -> anyhow::Result<Vec<TestKind>> {
        let response = self.get(&format!("/v1/accounts/{user_id}/completed")).await?;
        let body: CompletedResponse = response.json().await?;
        Ok(body.completed)
    }

    async fn record_usage(
        &self,
        user_id: &str,
        kind: TestKind,
        submission_id: Uuid,
    ) -> anyhow::Result<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/v1/accounts/{user_id}/usage"),
            &UsageRequest {
                kind,
                submission_id,
            },
        )
        .await?;
        Ok(())
    }

    async fn record_completion(&self, user_id: &str, kind: TestKind) -> anyhow::Result<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/v1/accounts/{user_id}/completions"),
            &CompletionRequest { kind },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for RemoteBackend {
    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/v1/submissions/{}", submission.submission_id),
            submission,
        )
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        match self.get(&format!("/v1/submissions/{id}")).await {
            Ok(response) => {
                let submission = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok(Some(submission))
            }
            Err(BackendError::ApiError { status: 404, .. }) => Ok(None),
            Err(e) => Err(store_error(e)),
        }
    }

    async fn save_report(&self, report: &EvaluationReport) -> Result<(), StoreError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/v1/reports/{}", report.submission_id),
            report,
        )
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn load_report(&self, id: Uuid) -> Result<Option<EvaluationReport>, StoreError> {
        match self.get(&format!("/v1/reports/{id}")).await {
            Ok(response) => {
                let report = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok(Some(report))
            }
            Err(BackendError::ApiError { status: 404, .. }) => Ok(None),
            Err(e) => Err(store_error(e)),
        }
    }
}

#[async_trait]
impl EvaluationQueue for RemoteBackend {
    async fn enqueue(&self, submission_id: Uuid) -> anyhow::Result<()> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/v1/evaluations/{submission_id}"),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn subscribe(&self, submission_id: Uuid) -> anyhow::Result<RawStatusStream> {
        let client = self.client.clone();
        let url = self.url(&format!("/v1/evaluations/{submission_id}/status"));
        let token = self.api_token.clone();
        let interval = self.poll_interval;

        // Poll until the request fails; the observer layer handles
        // deduplication and terminal-state detection.
        Ok(Box::pin(stream::unfold(true, move |first| {
            let client = client.clone();
            let url = url.clone();
            let token = token.clone();
            async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                let response = client.get(&url).bearer_auth(&token).send().await;
                let response = match response {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        tracing::warn!(%url, status = %response.status(), "status poll rejected");
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "status poll failed");
                        return None;
                    }
                };
                match response.json::<StatusResponse>().await {
                    Ok(body) => Some((body.status, false)),
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "malformed status payload");
                        None
                    }
                }
            }
        })))
    }
}

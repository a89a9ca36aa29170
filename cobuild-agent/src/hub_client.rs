//! REST client for the coordination hub.

use async_trait::async_trait;
use cobuild_core::{ChatMessage, PairId, ProgressReport, TaskConfig};
use cobuild_hub::{Ack, ApiError as HubServerError, PostChatRequest, PostReportRequest};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HubClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Hub rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// The hub operations an agent relies on.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// Where the hub lives, for diagnostics.
    fn endpoint(&self) -> &str;

    async fn task_config(&self, pair: PairId) -> Result<TaskConfig, HubClientError>;

    /// Current chat buffer of the pair, oldest first.
    async fn chat(&self, pair: PairId) -> Result<Vec<ChatMessage>, HubClientError>;

    async fn post_chat(&self, pair: PairId, from: &str, text: &str) -> Result<(), HubClientError>;

    async fn post_report(&self, report: &ProgressReport) -> Result<(), HubClientError>;
}

#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, HubClientError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, HubClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(url).send().await?;
        self.parse_response(response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, HubClientError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(url).json(body).send().await?;
        self.parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, HubClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let text = response.text().await?;
        let message = match serde_json::from_str::<HubServerError>(&text) {
            Ok(api_error) => format!("{}: {}", api_error.code, api_error.message),
            Err(_) => text,
        };
        Err(HubClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HubApi for HubClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn task_config(&self, pair: PairId) -> Result<TaskConfig, HubClientError> {
        self.get_json(&format!("/config/{}", pair)).await
    }

    async fn chat(&self, pair: PairId) -> Result<Vec<ChatMessage>, HubClientError> {
        self.get_json(&format!("/chat/{}", pair)).await
    }

    async fn post_chat(&self, pair: PairId, from: &str, text: &str) -> Result<(), HubClientError> {
        let body = PostChatRequest {
            from: Some(from.to_string()),
            text: Some(text.to_string()),
        };
        let ack: Ack = self.post_json(&format!("/chat/{}", pair), &body).await?;
        expect_ok(ack)
    }

    async fn post_report(&self, report: &ProgressReport) -> Result<(), HubClientError> {
        let body = PostReportRequest {
            name: Some(report.name.clone()),
            pair_id: Some(i64::from(report.pair_id.get())),
            msg: Some(report.msg.clone()),
        };
        let ack: Ack = self.post_json("/report", &body).await?;
        expect_ok(ack)
    }
}

fn expect_ok(ack: Ack) -> Result<(), HubClientError> {
    if ack.ok {
        Ok(())
    } else {
        Err(HubClientError::InvalidResponse("hub answered ok=false".to_string()))
    }
}

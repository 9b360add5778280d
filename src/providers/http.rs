//! HTTP answer service
//!
//! Posts `{"prompt": ...}` to `{base_url}/api/chat` and reads back
//! `{"text": ..., "url": ...}`. Any extra fields the server adds are ignored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Answer, AnswerError, AnswerService};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
}

/// Error body sent by the answer service on failure
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

pub struct HttpAnswerService {
    client: Client,
    endpoint: String,
}

impl HttpAnswerService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnswerError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn ask(&self, prompt: &str) -> Result<Answer, AnswerError> {
        tracing::debug!(endpoint = %self.endpoint, "Sending prompt");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { prompt })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => match err.details {
                    Some(details) => format!("{}: {}", err.error, details),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AnswerError::Status { status, body });
        }

        serde_json::from_str(&body).map_err(|e| {
            AnswerError::InvalidResponse(format!("Failed to parse answer: {} - Body: {}", e, body))
        })
    }
}

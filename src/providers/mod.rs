//! Answer service integrations

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpAnswerService;

/// A reply from the answer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Answer service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The remote call that turns a prompt into an answer.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<Answer, AnswerError>;
}

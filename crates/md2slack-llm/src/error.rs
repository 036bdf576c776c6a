use std::time::Duration;

use md2slack_core::Md2SlackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty LLM response")]
    Empty,

    #[error("unmarshal error: {message} (response: {response})")]
    Unmarshal { message: String, response: String },

    #[error("prompt file {0} not found")]
    PromptMissing(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    Tool(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] Md2SlackError),
}

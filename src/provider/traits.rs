use crate::config::ApiProvider;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const COMPUTER_USE_BETA_FLAG: &str = "computer-use-2024-10-22";
pub const PROMPT_CACHING_BETA_FLAG: &str = "prompt-caching-2024-07-31";

/// One Messages API request. Serializes to the first-party body shape;
/// backends that address the model in the URL strip `model` themselves.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<ContentBlock>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    /// Beta feature flags, sent as a header or body field depending on backend.
    #[serde(skip)]
    pub betas: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(other)]
    Other,
}

/// Parsed reply from the endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub usage: Usage,
    /// HTTP status of the exchange that produced this reply.
    #[serde(skip)]
    pub status: u16,
}

/// A hosted endpoint that answers Messages API requests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Which backend this client talks to.
    fn provider(&self) -> ApiProvider;

    /// Send one request and wait for the complete reply.
    async fn create_message(&self, request: &MessageRequest)
        -> Result<ModelResponse, ProviderError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Map a failed HTTP exchange onto an error variant.
    pub fn classify(status: u16, body: &str, retry_after_ms: Option<u64>) -> Self {
        match status {
            401 | 403 => Self::Auth(body.to_string()),
            429 => Self::RateLimited { retry_after_ms },
            _ => Self::Api {
                status,
                message: body.to_string(),
            },
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth(_) => Some(401),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

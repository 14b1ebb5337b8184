//! Amazon Bedrock `InvokeModel` client for Anthropic models.
//!
//! Authenticates with a Bedrock API key (`AWS_BEARER_TOKEN_BEDROCK`) sent as a
//! bearer token. The model id goes in the URL; beta flags go in the body as
//! `anthropic_beta`.

use super::http::post_messages;
use super::traits::*;
use crate::config::{self, ApiProvider, ConfigError};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use tracing::debug;

const BEDROCK_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_REGION: &str = "us-west-2";

pub struct BedrockClient {
    http: reqwest::Client,
    bearer_token: String,
    base_url: String,
    retry: RetryConfig,
}

impl BedrockClient {
    pub fn new(region: &str, bearer_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bearer_token: bearer_token.into(),
            base_url: format!("https://bedrock-runtime.{}.amazonaws.com", region),
            retry: RetryConfig::default(),
        }
    }

    /// Region from `AWS_REGION` (default `us-west-2`), token from
    /// `AWS_BEARER_TOKEN_BEDROCK`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let region = std::env::var("AWS_REGION")
            .ok()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let token = config::require_env("AWS_BEARER_TOKEN_BEDROCK")?;
        Ok(Self::new(&region, token))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/model/{}/invoke",
            self.base_url,
            model.replace(':', "%3A")
        )
    }
}

#[async_trait]
impl ModelClient for BedrockClient {
    fn provider(&self) -> ApiProvider {
        ApiProvider::Bedrock
    }

    async fn create_message(
        &self,
        request: &MessageRequest,
    ) -> Result<ModelResponse, ProviderError> {
        let body = build_bedrock_body(request)?;
        let url = self.url(&request.model);
        debug!("Bedrock request: model={} url={}", request.model, url);
        let headers = [("authorization", format!("Bearer {}", self.bearer_token))];
        post_messages(&self.http, &url, &headers, &body, &self.retry).await
    }
}

fn build_bedrock_body(request: &MessageRequest) -> Result<serde_json::Value, ProviderError> {
    let mut body = serde_json::to_value(request).map_err(|e| ProviderError::Other(e.to_string()))?;
    if let Some(obj) = body.as_object_mut() {
        obj.remove("model");
        obj.insert("anthropic_version".into(), BEDROCK_VERSION.into());
        if !request.betas.is_empty() {
            obj.insert("anthropic_beta".into(), serde_json::json!(request.betas));
        }
    }
    Ok(body)
}

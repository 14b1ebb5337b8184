//! Anthropic first-party Messages API client.

use super::http::post_messages;
use super::traits::*;
use crate::config::ApiProvider;
use crate::retry::RetryConfig;
use async_trait::async_trait;
use tracing::debug;

const API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: API_URL.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn headers(&self, request: &MessageRequest) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ];
        if !request.betas.is_empty() {
            headers.push(("anthropic-beta", request.betas.join(",")));
        }
        headers
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn provider(&self) -> ApiProvider {
        ApiProvider::Anthropic
    }

    async fn create_message(
        &self,
        request: &MessageRequest,
    ) -> Result<ModelResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Auth(
                "no API key: store one in ~/.anthropic/api_key or set ANTHROPIC_API_KEY".into(),
            ));
        }
        let body = build_request_body(request)?;
        debug!(
            "Anthropic request: model={}, messages={}, betas={:?}",
            request.model,
            request.messages.len(),
            request.betas
        );
        let url = format!("{}/v1/messages", self.base_url);
        post_messages(&self.http, &url, &self.headers(request), &body, &self.retry).await
    }
}

fn build_request_body(request: &MessageRequest) -> Result<serde_json::Value, ProviderError> {
    serde_json::to_value(request).map_err(|e| ProviderError::Other(e.to_string()))
}

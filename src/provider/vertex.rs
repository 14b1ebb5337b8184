//! Google Vertex AI `rawPredict` client for Anthropic models.
//!
//! The access token in `GOOGLE_OAUTH_ACCESS_TOKEN` is an OAuth2 bearer token.
//! Callers are responsible for obtaining it (e.g. `gcloud auth print-access-token`).

use super::http::post_messages;
use super::traits::*;
use crate::config::{self, ApiProvider, ConfigError};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use tracing::debug;

const VERTEX_VERSION: &str = "vertex-2023-10-16";

pub struct VertexClient {
    http: reqwest::Client,
    access_token: String,
    project_id: String,
    region: String,
    base_url: String,
    retry: RetryConfig,
}

impl VertexClient {
    pub fn new(
        project_id: impl Into<String>,
        region: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let base_url = if region == "global" {
            "https://aiplatform.googleapis.com".to_string()
        } else {
            format!("https://{}-aiplatform.googleapis.com", region)
        };
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            project_id: project_id.into(),
            region,
            base_url,
            retry: RetryConfig::default(),
        }
    }

    /// Project from `ANTHROPIC_VERTEX_PROJECT_ID`, region from
    /// `CLOUD_ML_REGION`, token from `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(
            config::require_env("ANTHROPIC_VERTEX_PROJECT_ID")?,
            config::require_env("CLOUD_ML_REGION")?,
            config::require_env("GOOGLE_OAUTH_ACCESS_TOKEN")?,
        ))
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
            "{}/v1/projects/{}/locations/{}/publishers/anthropic/models/{}:rawPredict",
            self.base_url, self.project_id, self.region, model
        )
    }
}

#[async_trait]
impl ModelClient for VertexClient {
    fn provider(&self) -> ApiProvider {
        ApiProvider::Vertex
    }

    async fn create_message(
        &self,
        request: &MessageRequest,
    ) -> Result<ModelResponse, ProviderError> {
        let body = build_vertex_body(request)?;
        let url = self.url(&request.model);
        debug!("Vertex request: model={} url={}", request.model, url);
        let mut headers = vec![("authorization", format!("Bearer {}", self.access_token))];
        if !request.betas.is_empty() {
            headers.push(("anthropic-beta", request.betas.join(",")));
        }
        post_messages(&self.http, &url, &headers, &body, &self.retry).await
    }
}

fn build_vertex_body(request: &MessageRequest) -> Result<serde_json::Value, ProviderError> {
    let mut body = serde_json::to_value(request).map_err(|e| ProviderError::Other(e.to_string()))?;
    if let Some(obj) = body.as_object_mut() {
        obj.remove("model");
        obj.insert("anthropic_version".into(), VERTEX_VERSION.into());
    }
    Ok(body)
}

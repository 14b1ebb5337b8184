//! Shared JSON POST with client-layer retry, used by every backend.

use super::traits::*;
use crate::retry::{log_retry, RetryConfig};
use tracing::debug;

/// POST `body` to `url` and parse a Messages API reply, retrying transient
/// failures according to `retry`.
pub(crate) async fn post_messages(
    http: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    retry: &RetryConfig,
) -> Result<ModelResponse, ProviderError> {
    let mut attempt = 0;
    loop {
        match post_once(http, url, headers, body).await {
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                let delay = e
                    .retry_after()
                    .unwrap_or_else(|| retry.delay_for_attempt(attempt));
                log_retry(attempt, retry.max_retries, &delay, &e);
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

async fn post_once(
    http: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
) -> Result<ModelResponse, ProviderError> {
    let mut builder = http
        .post(url)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }

    let response = builder
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|secs| (secs * 1000.0) as u64);
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::classify(
            status.as_u16(),
            &text,
            retry_after_ms,
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Network(e.to_string()))?;
    let mut parsed: ModelResponse = serde_json::from_str(&text)
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", e, text)))?;
    parsed.status = status.as_u16();
    debug!(
        status = parsed.status,
        blocks = parsed.content.len(),
        "Endpoint reply parsed"
    );
    Ok(parsed)
}

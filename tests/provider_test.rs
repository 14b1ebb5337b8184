//! HTTP-level tests for the endpoint clients against a local mock server.

use computer_use::provider::*;
use computer_use::retry::RetryConfig;
use computer_use::types::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn fast_retry(max_retries: usize) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 1,
    }
}

fn reply() -> serde_json::Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Listing files."},
            {"type": "tool_use", "id": "toolu_01", "name": "bash", "input": {"command": "ls"}}
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 100, "output_tokens": 20, "cache_read_input_tokens": 300}
    })
}

fn request(model: &str) -> MessageRequest {
    MessageRequest {
        model: model.into(),
        max_tokens: 1024,
        system: vec![ContentBlock::text("You are helpful.")],
        messages: vec![Message::user("list files")],
        tools: vec![json!({"type": "bash_20241022", "name": "bash"})],
        betas: vec![COMPUTER_USE_BETA_FLAG.into()],
    }
}

#[tokio::test]
async fn test_anthropic_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(header("anthropic-beta", "computer-use-2024-10-22"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 1024,
            "system": [{"type": "text", "text": "You are helpful."}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test").with_base_url(server.uri());
    let response = client
        .create_message(&request("claude-3-5-sonnet-20241022"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(response.content.len(), 2);
    assert_eq!(
        response.content[1],
        ContentBlock::tool_use("toolu_01", "bash", json!({"command": "ls"}))
    );
    assert_eq!(response.usage.cache_read, 300);
}

#[tokio::test]
async fn test_anthropic_missing_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
        .expect(0)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("").with_base_url(server.uri());
    let err = client.create_message(&request("m")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)));
}

#[tokio::test]
async fn test_overloaded_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test")
        .with_base_url(server.uri())
        .with_retry_config(fast_retry(3));
    let response = client.create_message(&request("m")).await.unwrap();
    assert_eq!(response.id, "msg_01");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test")
        .with_base_url(server.uri())
        .with_retry_config(fast_retry(2));
    let err = client.create_message(&request("m")).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("messages: field required"))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test")
        .with_base_url(server.uri())
        .with_retry_config(fast_retry(4));
    let err = client.create_message(&request("m")).await.unwrap_err();
    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("field required"));
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test")
        .with_base_url(server.uri())
        .with_retry_config(fast_retry(1));
    assert!(client.create_message(&request("m")).await.is_ok());
}

#[tokio::test]
async fn test_bedrock_invoke_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/model/.+/invoke$"))
        .and(header("authorization", "Bearer br-token"))
        .and(body_partial_json(json!({
            "anthropic_version": "bedrock-2023-05-31",
            "anthropic_beta": ["computer-use-2024-10-22"],
            "max_tokens": 1024
        })))
        .respond_with(|req: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap_or_default();
            // The model travels in the URL only
            if body.get("model").is_some() {
                ResponseTemplate::new(400)
            } else {
                ResponseTemplate::new(200).set_body_json(reply())
            }
        })
        .expect(1)
        .mount(&server)
        .await;

    let client = BedrockClient::new("us-west-2", "br-token").with_base_url(server.uri());
    assert_eq!(client.provider(), computer_use::ApiProvider::Bedrock);
    let response = client
        .create_message(&request("anthropic.claude-3-5-sonnet-20241022-v2:0"))
        .await
        .unwrap();
    assert_eq!(response.content.len(), 2);
}

#[tokio::test]
async fn test_vertex_raw_predict_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(
            r"^/v1/projects/demo-project/locations/us-east5/publishers/anthropic/models/.+:rawPredict$",
        ))
        .and(header("authorization", "Bearer ya29.token"))
        .and(header("anthropic-beta", "computer-use-2024-10-22"))
        .and(body_partial_json(json!({"anthropic_version": "vertex-2023-10-16"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
        .expect(1)
        .mount(&server)
        .await;

    let client = VertexClient::new("demo-project", "us-east5", "ya29.token").with_base_url(server.uri());
    let response = client
        .create_message(&request("claude-3-5-sonnet-v2@20241022"))
        .await
        .unwrap();
    assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
}

#[tokio::test]
async fn test_malformed_reply_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-test").with_base_url(server.uri());
    let err = client.create_message(&request("m")).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

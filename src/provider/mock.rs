//! Mock client for testing. No real API calls.

use super::traits::*;
use crate::config::ApiProvider;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Mutex;

/// A scripted reply: plain text, tool calls, or an endpoint failure.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls(Vec<MockToolCall>),
    /// Text followed by tool calls in one reply.
    TextAndToolCalls(String, Vec<MockToolCall>),
    Error(ProviderError),
}

#[derive(Debug, Clone)]
pub struct MockToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl MockToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Mock endpoint for tests. Supply a sequence of replies; every request is
/// recorded for inspection.
pub struct MockClient {
    provider: ApiProvider,
    responses: Mutex<Vec<MockResponse>>,
    requests: Mutex<Vec<MessageRequest>>,
}

impl MockClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            provider: ApiProvider::Anthropic,
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: client that always returns the same text
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Pretend to be a different backend (changes caching behaviour in the loop).
    pub fn with_provider(mut self, provider: ApiProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<MessageRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn provider(&self) -> ApiProvider {
        self.provider
    }

    async fn create_message(
        &self,
        request: &MessageRequest,
    ) -> Result<ModelResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let response = {
            let mut responses = self
                .responses
                .lock()
                .map_err(|_| ProviderError::Other("mock poisoned".into()))?;
            if responses.is_empty() {
                MockResponse::Text("(no more mock responses)".into())
            } else {
                responses.remove(0)
            }
        };

        let (content, stop_reason) = match response {
            MockResponse::Text(text) => (vec![ContentBlock::text(text)], StopReason::EndTurn),
            MockResponse::ToolCalls(calls) => (tool_blocks(calls), StopReason::ToolUse),
            MockResponse::TextAndToolCalls(text, calls) => {
                let mut content = vec![ContentBlock::text(text)];
                content.extend(tool_blocks(calls));
                (content, StopReason::ToolUse)
            }
            MockResponse::Error(e) => return Err(e),
        };

        Ok(ModelResponse {
            id: format!("msg_mock_{}", uuid::Uuid::new_v4().simple()),
            content,
            stop_reason: Some(stop_reason),
            usage: Usage::default(),
            status: 200,
        })
    }
}

fn tool_blocks(calls: Vec<MockToolCall>) -> Vec<ContentBlock> {
    calls
        .into_iter()
        .map(|call| {
            ContentBlock::tool_use(
                format!("toolu_mock_{}", uuid::Uuid::new_v4().simple()),
                call.name,
                call.arguments,
            )
        })
        .collect()
}

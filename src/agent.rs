//! Stateful Agent struct — wraps the sampling loop with conversation state
//! and abort support. One agent per conversation.

use crate::agent_loop::{sampling_loop, AgentContext, AgentLoopConfig, LoopOutcome};
use crate::config::DEFAULT_MAX_TOKENS;
use crate::context::ImageRetention;
use crate::provider::ModelClient;
use crate::tools::ToolCollection;
use crate::types::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The main Agent. Owns history, tools, and a handle to the model client.
pub struct Agent {
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub image_retention: Option<ImageRetention>,
    messages: Vec<Message>,
    tools: ToolCollection,
    client: Arc<dyn ModelClient>,
    cancel: Option<CancellationToken>,
}

impl Agent {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            system_prompt: String::new(),
            model: client.provider().default_model().to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            image_retention: None,
            messages: Vec::new(),
            tools: ToolCollection::new(Vec::new()),
            client,
            cancel: None,
        }
    }

    // -- Builder-style setters --

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_tools(mut self, tools: ToolCollection) -> Self {
        self.tools = tools;
        self
    }

    /// Keep only the `keep` most recent screenshots in history.
    pub fn with_image_retention(mut self, retention: ImageRetention) -> Self {
        self.image_retention = Some(retention);
        self
    }

    pub fn with_messages(mut self, msgs: Vec<Message>) -> Self {
        self.messages = msgs;
        self
    }

    // -- State access --

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tools(&self) -> &ToolCollection {
        &self.tools
    }

    // -- Control --

    pub fn abort(&self) {
        if let Some(ref cancel) = self.cancel {
            cancel.cancel();
        }
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.cancel = None;
    }

    // -- Prompting --

    /// Append a user message and run the loop until the model stops calling
    /// tools. Events are sent on `tx` as they happen.
    pub async fn prompt(
        &mut self,
        text: impl Into<String>,
        tx: mpsc::UnboundedSender<LoopEvent>,
        cancel: CancellationToken,
    ) -> LoopOutcome {
        self.messages.push(Message::user(text));
        self.cancel = Some(cancel.clone());

        // Move state into the loop context and back afterwards
        let mut context = AgentContext {
            system_prompt: self.system_prompt.clone(),
            messages: std::mem::take(&mut self.messages),
            tools: std::mem::replace(&mut self.tools, ToolCollection::new(Vec::new())),
        };

        let config = AgentLoopConfig {
            client: &*self.client,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            image_retention: self.image_retention,
        };

        let outcome = sampling_loop(&mut context, &config, tx, cancel).await;

        self.messages = context.messages;
        self.tools = context.tools;
        self.cancel = None;
        outcome
    }
}

//! The sampling loop: request → content blocks → tool execution → repeat.
//!
//! - Each iteration sends the whole history to the endpoint
//! - Every returned block is reported on the event channel
//! - Tool calls run one at a time, in order, and their results go back as
//!   a single user turn
//! - The loop ends on a reply without tool calls, on an endpoint error, or
//!   on cancellation

use crate::context::{self, ImageRetention};
use crate::provider::{
    MessageRequest, ModelClient, ProviderError, COMPUTER_USE_BETA_FLAG, PROMPT_CACHING_BETA_FLAG,
};
use crate::tools::ToolCollection;
use crate::types::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Conversation state driven by the loop.
pub struct AgentContext {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: ToolCollection,
}

/// Configuration for the sampling loop
pub struct AgentLoopConfig<'a> {
    pub client: &'a dyn ModelClient,
    pub model: String,
    pub max_tokens: u32,
    /// Screenshot retention. Ignored when the backend supports prompt
    /// caching, since trimming would invalidate the cached prefix.
    pub image_retention: Option<ImageRetention>,
}

/// How a run of the loop ended.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The model replied without requesting a tool.
    Completed,
    /// The endpoint failed; history holds everything up to the failing request.
    ApiError(ProviderError),
    Cancelled,
}

impl LoopOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Run the loop until the model stops calling tools.
///
/// The history in `context` is extended in place: one assistant turn per
/// reply, plus one tool-results turn per reply that used tools.
pub async fn sampling_loop(
    context: &mut AgentContext,
    config: &AgentLoopConfig<'_>,
    tx: mpsc::UnboundedSender<LoopEvent>,
    cancel: CancellationToken,
) -> LoopOutcome {
    let caching = config.client.provider().supports_prompt_caching();

    let mut system = ContentBlock::text(context.system_prompt.clone());
    let mut betas = vec![COMPUTER_USE_BETA_FLAG.to_string()];
    if caching {
        betas.push(PROMPT_CACHING_BETA_FLAG.to_string());
        system.set_cache_control(Some(CacheControl::Ephemeral));
    }

    let mut turn = 0usize;
    loop {
        if cancel.is_cancelled() {
            return LoopOutcome::Cancelled;
        }
        turn += 1;

        if caching {
            context::inject_prompt_caching(&mut context.messages);
        } else if let Some(retention) = config.image_retention {
            let removed = context::filter_to_n_most_recent_images(&mut context.messages, retention);
            if removed > 0 {
                debug!(removed, "dropped old screenshots from history");
            }
        }

        let request = MessageRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system: vec![system.clone()],
            messages: context.messages.clone(),
            tools: context.tools.describe(),
            betas: betas.clone(),
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return LoopOutcome::Cancelled,
            result = config.client.create_message(&request) => result,
        };

        let response = match result {
            Ok(response) => {
                tx.send(LoopEvent::ApiResponse {
                    status: Some(response.status),
                    error: None,
                })
                .ok();
                response
            }
            Err(e) => {
                warn!(turn, error = %e, "model request failed");
                tx.send(LoopEvent::ApiResponse {
                    status: e.status(),
                    error: Some(e.to_string()),
                })
                .ok();
                return LoopOutcome::ApiError(e);
            }
        };

        debug!(
            turn,
            input = response.usage.input,
            output = response.usage.output,
            cache_read = response.usage.cache_read,
            cache_write = response.usage.cache_write,
            cache_hit_rate = %format!("{:.1}%", response.usage.cache_hit_rate() * 100.0),
            "turn usage"
        );

        context
            .messages
            .push(Message::assistant(response.content.clone()));

        let mut tool_results = Vec::new();
        for block in response.content {
            tx.send(LoopEvent::Output {
                block: block.clone(),
            })
            .ok();

            if let ContentBlock::ToolUse {
                id, name, input, ..
            } = block
            {
                // Remaining calls still get a result so every tool_use stays answered
                if cancel.is_cancelled() {
                    tool_results.push(ToolResult::error("Tool execution cancelled").to_content_block(&id));
                    continue;
                }
                info!(turn, tool = %name, "executing tool");
                let result = context.tools.run(&name, input).await;
                tool_results.push(result.to_content_block(&id));
                tx.send(LoopEvent::ToolOutput {
                    tool_use_id: id,
                    result,
                })
                .ok();
            }
        }

        if tool_results.is_empty() {
            return LoopOutcome::Completed;
        }
        context.messages.push(Message::tool_results(tool_results));
        if cancel.is_cancelled() {
            return LoopOutcome::Cancelled;
        }
    }
}

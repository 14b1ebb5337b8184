//! History maintenance between endpoint requests.
//!
//! - Prompt-cache breakpoints on the most recent user turns
//! - Bounded retention of screenshot images inside tool results
//!
//! Both mutate the history in place and never reorder messages.

use crate::types::*;

/// User turns that get a cache breakpoint. The fourth breakpoint the API
/// allows is left for the system prompt.
pub const CACHE_BREAKPOINTS: usize = 3;

/// How many tool-result images to keep, and the chunk size removals are
/// rounded to so the cached prefix is not invalidated on every turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRetention {
    pub keep: usize,
    pub min_removal_chunk: usize,
}

impl ImageRetention {
    /// Keep `keep` images, removing in chunks of the same size.
    pub fn new(keep: usize) -> Self {
        Self {
            keep,
            min_removal_chunk: keep,
        }
    }

    pub fn with_min_removal_chunk(mut self, chunk: usize) -> Self {
        self.min_removal_chunk = chunk;
        self
    }
}

/// Tag the last block of the [`CACHE_BREAKPOINTS`] most recent user messages
/// as ephemeral cache breakpoints. The next older user message has any stale
/// marker removed, and scanning stops there.
pub fn inject_prompt_caching(messages: &mut [Message]) {
    let mut breakpoints_remaining = CACHE_BREAKPOINTS;
    for message in messages.iter_mut().rev() {
        if message.role != Role::User {
            continue;
        }
        let Some(last) = message.content.last_mut() else {
            continue;
        };
        if breakpoints_remaining > 0 {
            breakpoints_remaining -= 1;
            last.set_cache_control(Some(CacheControl::Ephemeral));
        } else {
            last.set_cache_control(None);
            // At most one turn is added per loop iteration
            break;
        }
    }
}

/// Count image blocks carried inside tool results.
pub fn count_tool_result_images(messages: &[Message]) -> usize {
    messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(|block| match block {
            ContentBlock::ToolResult { content, .. } => {
                content.iter().filter(|c| c.is_image()).count()
            }
            _ => 0,
        })
        .sum()
}

/// Drop the oldest tool-result images so roughly `retention.keep` remain.
///
/// The number removed is `total - keep` rounded down to a multiple of
/// `min_removal_chunk`. Returns how many images were removed.
pub fn filter_to_n_most_recent_images(
    messages: &mut [Message],
    retention: ImageRetention,
) -> usize {
    let total = count_tool_result_images(messages);
    let chunk = retention.min_removal_chunk.max(1);
    let excess = total.saturating_sub(retention.keep);
    let mut to_remove = excess - excess % chunk;
    let removed = to_remove;
    if to_remove == 0 {
        return 0;
    }

    for block in messages.iter_mut().flat_map(|m| m.content.iter_mut()) {
        if to_remove == 0 {
            break;
        }
        if let ContentBlock::ToolResult { content, .. } = block {
            content.retain(|c| {
                if c.is_image() && to_remove > 0 {
                    to_remove -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }
    removed
}

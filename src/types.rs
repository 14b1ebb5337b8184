use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Content blocks
// ---------------------------------------------------------------------------

/// Prompt-cache hint attached to a content block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheControl {
    Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

/// One block of message content, serialized in the Messages API wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        source: ImageSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Vec<ContentBlock>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// A base64-encoded PNG image block.
    pub fn png(data: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource {
                kind: "base64".into(),
                media_type: "image/png".into(),
                data: data.into(),
            },
            cache_control: None,
        }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            cache_control: None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    pub fn cache_control(&self) -> Option<CacheControl> {
        match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => *cache_control,
        }
    }

    pub fn set_cache_control(&mut self, value: Option<CacheControl>) {
        match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => *cache_control = value,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// A user turn carrying tool results back to the model.
    pub fn tool_results(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ---------------------------------------------------------------------------
// Tool definition
// ---------------------------------------------------------------------------

/// A tool the model can call. Implement this trait for desktop capabilities.
#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    /// Unique tool name (matches `tool_use.name`)
    fn name(&self) -> &str;
    /// Tool descriptor sent with every request
    fn to_param(&self) -> serde_json::Value;
    /// Execute the tool
    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError>;
}

/// Uniform result of running a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub base64_image: Option<String>,
    pub system: Option<String>,
}

impl ToolResult {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.base64_image = Some(base64_image.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Merge two results: text fields concatenate, image and system must not
    /// both be set.
    pub fn combine(self, other: ToolResult) -> Result<ToolResult, ToolError> {
        Ok(Self {
            output: combine_field(self.output, other.output, true)?,
            error: combine_field(self.error, other.error, true)?,
            base64_image: combine_field(self.base64_image, other.base64_image, false)?,
            system: combine_field(self.system, other.system, false)?,
        })
    }

    /// Convert into a `tool_result` block answering `tool_use_id`.
    pub fn to_content_block(&self, tool_use_id: &str) -> ContentBlock {
        let mut content = Vec::new();
        let is_error = self.is_error();
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            content.push(ContentBlock::text(self.with_system_prefix(error)));
        } else {
            if let Some(output) = self.output.as_deref().filter(|o| !o.is_empty()) {
                content.push(ContentBlock::text(self.with_system_prefix(output)));
            }
            if let Some(image) = self.base64_image.as_deref().filter(|i| !i.is_empty()) {
                content.push(ContentBlock::png(image));
            }
        }
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content,
            is_error,
            cache_control: None,
        }
    }

    fn with_system_prefix(&self, text: &str) -> String {
        match self.system.as_deref().filter(|s| !s.is_empty()) {
            Some(system) => format!("<system>{}</system>\n{}", system, text),
            None => text.to_string(),
        }
    }
}

fn combine_field(
    a: Option<String>,
    b: Option<String>,
    concatenate: bool,
) -> Result<Option<String>, ToolError> {
    match (a.filter(|s| !s.is_empty()), b.filter(|s| !s.is_empty())) {
        (Some(a), Some(b)) if concatenate => Ok(Some(a + &b)),
        (Some(_), Some(_)) => Err(ToolError::Failed("Cannot combine tool results".into())),
        (a, b) => Ok(a.or(b)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

// ---------------------------------------------------------------------------
// Loop events (observer channel)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// Diagnostics for one endpoint round trip.
    ApiResponse {
        status: Option<u16>,
        error: Option<String>,
    },
    /// One content block produced by the model.
    Output { block: ContentBlock },
    /// A finished tool invocation.
    ToolOutput {
        tool_use_id: String,
        result: ToolResult,
    },
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default, rename = "input_tokens")]
    pub input: u64,
    #[serde(default, rename = "output_tokens")]
    pub output: u64,
    #[serde(default, rename = "cache_read_input_tokens")]
    pub cache_read: u64,
    #[serde(default, rename = "cache_creation_input_tokens")]
    pub cache_write: u64,
}

impl Usage {
    /// Fraction of input tokens served from cache (0.0–1.0).
    pub fn cache_hit_rate(&self) -> f64 {
        let total_input = self.input + self.cache_read + self.cache_write;
        if total_input == 0 {
            return 0.0;
        }
        self.cache_read as f64 / total_input as f64
    }
}

pub mod anthropic;
pub mod bedrock;
mod http;
pub mod mock;
pub mod traits;
pub mod vertex;

pub use anthropic::AnthropicClient;
pub use bedrock::BedrockClient;
pub use mock::MockClient;
pub use traits::*;
pub use vertex::VertexClient;

use crate::config::{ApiProvider, ConfigError};
use std::sync::Arc;

/// Build the client for `provider`. The API key is only used by the
/// first-party backend; the others read their credentials from the environment.
pub fn client_for(
    provider: ApiProvider,
    api_key: impl Into<String>,
) -> Result<Arc<dyn ModelClient>, ConfigError> {
    Ok(match provider {
        ApiProvider::Anthropic => Arc::new(AnthropicClient::new(api_key)),
        ApiProvider::Bedrock => Arc::new(BedrockClient::from_env()?),
        ApiProvider::Vertex => Arc::new(VertexClient::from_env()?),
    })
}

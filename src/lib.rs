pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod context;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod server;
pub mod tools;
pub mod types;
pub mod workflow;

pub use agent::Agent;
pub use agent_loop::{sampling_loop, AgentContext, AgentLoopConfig, LoopOutcome};
pub use config::ApiProvider;
pub use context::ImageRetention;
pub use retry::RetryConfig;
pub use tools::ToolCollection;
pub use types::*;

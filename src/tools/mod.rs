pub mod bash;
pub mod computer;
pub mod edit;
pub mod run;

pub use bash::BashTool;
pub use computer::{ComputerTool, ScalingSource};
pub use edit::EditTool;

use crate::config::ConfigError;
use crate::types::{AgentTool, ToolResult};
use tracing::{debug, warn};

/// The tools offered to the model for one conversation, dispatched by name.
pub struct ToolCollection {
    tools: Vec<Box<dyn AgentTool>>,
}

impl ToolCollection {
    pub fn new(tools: Vec<Box<dyn AgentTool>>) -> Self {
        Self { tools }
    }

    /// The standard desktop set: computer, bash and the file editor.
    /// Screen geometry comes from `WIDTH`/`HEIGHT`/`DISPLAY_NUM`.
    pub fn computer_use() -> Result<Self, ConfigError> {
        Ok(Self::new(vec![
            Box::new(ComputerTool::from_env()?),
            Box::new(BashTool::default()),
            Box::new(EditTool::new()),
        ]))
    }

    /// Tool descriptors for the request body, in registration order.
    pub fn describe(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(|t| t.to_param()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Run the named tool. Failures, including an unknown name, come back as
    /// an error result rather than an `Err`.
    pub async fn run(&self, name: &str, input: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            warn!(tool = name, "model requested an unknown tool");
            return ToolResult::error(format!("Tool {} is invalid", name));
        };
        debug!(tool = name, %input, "running tool");
        match tool.execute(input).await {
            Ok(result) => result,
            Err(e) => {
                debug!(tool = name, error = %e, "tool failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

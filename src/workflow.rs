//! WiFi troubleshooting assistant: a fixed four-step flow.
//!
//! Each user message runs `identify_issue → run_diagnostics →
//! apply_resolution → verify_resolution` in order. Steps are gated by the
//! state flags, so a step that has already done its work is skipped.

use crate::config::ApiProvider;
use crate::provider::{MessageRequest, ModelClient};
use crate::types::*;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

pub const WORKFLOW_MAX_TOKENS: u32 = 4000;

/// Client-side attempts for the workflow's Bedrock calls.
pub const WORKFLOW_MAX_ATTEMPTS: usize = 10;

const GREETING: &str = "Hello! I understand you're experiencing WiFi connectivity issues. Could you please describe the problem you're facing?";
const CONFIRMED_REPLY: &str =
    "I'll help you troubleshoot your WiFi connectivity issue. Let me run some diagnostics.";
const MORE_INFO_REPLY: &str = "Could you provide more details about your WiFi connectivity issues? Are you experiencing disconnections or slow speeds?";
const DIAGNOSTICS_PROMPT: &str = "Generate a diagnostic analysis for WiFi issues covering:
1. Network adapter status check
2. DHCP lease verification
3. Signal strength assessment";
const RESOLUTION_STEPS: &str = "Applying the following fixes:
1. Flushing DNS cache
2. Renewing DHCP lease
3. Resetting network adapter

Please follow these steps to reconnect:
1. Go to device settings
2. Enable WiFi
3. Select your network and connect";
const VERIFY_QUESTION: &str = "Is your WiFi connection working properly now?";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    IdentifyIssue,
    RunDiagnostics,
    ApplyResolution,
    VerifyResolution,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IdentifyIssue => "identify_issue",
            Self::RunDiagnostics => "run_diagnostics",
            Self::ApplyResolution => "apply_resolution",
            Self::VerifyResolution => "verify_resolution",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub messages: Vec<Message>,
    /// The step the conversation is waiting on.
    pub current_step: Step,
    pub issue_identified: bool,
    pub diagnostics_complete: bool,
    pub user_approval: bool,
    pub resolution_complete: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Empty message")]
    EmptyMessage,
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct WifiWorkflow {
    client: Arc<dyn ModelClient>,
    model: String,
    max_tokens: u32,
    state: WorkflowState,
}

impl WifiWorkflow {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            model: ApiProvider::Bedrock.default_model().to_string(),
            max_tokens: WORKFLOW_MAX_TOKENS,
            state: WorkflowState::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Run the flow on the empty conversation, producing the greeting.
    pub async fn start(&mut self) -> Vec<Message> {
        self.run().await
    }

    /// Record a user message, run the steps, and return the assistant
    /// messages they appended.
    pub async fn handle_user_message(&mut self, text: &str) -> Result<Vec<Message>, WorkflowError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkflowError::EmptyMessage);
        }
        self.state.messages.push(Message::user(text));

        // Approval only counts once the fixes have been proposed
        let lowered = text.to_lowercase();
        if self.state.diagnostics_complete
            && (lowered.contains("yes") || lowered.contains("proceed"))
        {
            self.state.user_approval = true;
        }

        Ok(self.run().await)
    }

    async fn run(&mut self) -> Vec<Message> {
        let before = self.state.messages.len();
        self.identify_issue().await;
        self.run_diagnostics().await;
        let resolved_now = self.apply_resolution();
        if resolved_now {
            self.verify_resolution();
        }
        self.state.current_step = self.pending_step();
        self.state.messages[before..].to_vec()
    }

    fn pending_step(&self) -> Step {
        let s = &self.state;
        if !s.issue_identified {
            Step::IdentifyIssue
        } else if !s.diagnostics_complete {
            Step::RunDiagnostics
        } else if !s.resolution_complete {
            Step::ApplyResolution
        } else {
            Step::VerifyResolution
        }
    }

    fn say(&mut self, text: impl Into<String>) {
        self.state
            .messages
            .push(Message::assistant(vec![ContentBlock::text(text)]));
    }

    async fn identify_issue(&mut self) {
        info!(step = %Step::IdentifyIssue, "running step");
        let Some(last) = self.state.messages.last() else {
            self.say(GREETING);
            return;
        };
        if self.state.issue_identified {
            return;
        }
        let prompt = format!(
            "Based on the user's description, determine if they are experiencing WiFi connectivity issues.\nUser message: {}\nRespond with either 'confirmed' or 'need_more_info'.",
            last.text()
        );
        let verdict = self.invoke(&prompt).await;
        if verdict.to_lowercase().contains("confirmed") {
            self.state.issue_identified = true;
            self.say(CONFIRMED_REPLY);
        } else {
            self.say(MORE_INFO_REPLY);
        }
    }

    async fn run_diagnostics(&mut self) {
        if !self.state.issue_identified || self.state.diagnostics_complete {
            return;
        }
        info!(step = %Step::RunDiagnostics, "running step");
        let results = self.invoke(DIAGNOSTICS_PROMPT).await;
        self.state.diagnostics_complete = true;
        self.say(format!(
            "Diagnostic Results:\n{}\n\nWould you like me to proceed with applying the recommended fixes?",
            results
        ));
    }

    fn apply_resolution(&mut self) -> bool {
        if !self.state.user_approval || self.state.resolution_complete {
            return false;
        }
        info!(step = %Step::ApplyResolution, "running step");
        self.state.resolution_complete = true;
        self.say(RESOLUTION_STEPS);
        true
    }

    fn verify_resolution(&mut self) {
        info!(step = %Step::VerifyResolution, "running step");
        self.say(VERIFY_QUESTION);
    }

    /// One single-turn completion. Failures become an error text so the
    /// conversation can continue.
    async fn invoke(&self, prompt: &str) -> String {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Vec::new(),
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            betas: Vec::new(),
        };
        match self.client.create_message(&request).await {
            Ok(response) => response
                .content
                .iter()
                .find_map(|block| match block {
                    ContentBlock::Text { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "error invoking model");
                format!("Error: Unable to process request. {}", e)
            }
        }
    }
}

/// Line-oriented terminal front end. `quit` or `exit` (or end of input) stops.
pub async fn run_terminal<R, W>(
    workflow: &mut WifiWorkflow,
    input: R,
    mut output: W,
) -> Result<(), WorkflowError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(b"WiFi Troubleshooting Assistant\n\n")
        .await?;
    for message in workflow.start().await {
        print_message(&mut output, &message).await?;
    }

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        match workflow.handle_user_message(line).await {
            Ok(replies) => {
                for message in &replies {
                    print_message(&mut output, message).await?;
                }
            }
            Err(WorkflowError::EmptyMessage) => continue,
            Err(e) => return Err(e),
        }
    }
    output.flush().await?;
    Ok(())
}

async fn print_message<W: AsyncWrite + Unpin>(
    output: &mut W,
    message: &Message,
) -> Result<(), WorkflowError> {
    output
        .write_all(format!("{}: {}\n\n", message.role, message.text()).as_bytes())
        .await?;
    Ok(())
}

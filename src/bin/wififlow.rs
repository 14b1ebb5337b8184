//! Terminal front end for the WiFi troubleshooting assistant.
//!
//! Talks to Claude on Bedrock (`AWS_REGION`, default `us-west-2`;
//! `AWS_BEARER_TOKEN_BEDROCK`). Type `quit` to leave.

use clap::Parser;
use computer_use::provider::BedrockClient;
use computer_use::retry::RetryConfig;
use computer_use::workflow::{self, WifiWorkflow, WORKFLOW_MAX_ATTEMPTS};
use std::sync::Arc;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "wififlow", about = "WiFi troubleshooting assistant", version)]
struct Cli {
    /// Override the Bedrock model id
    #[arg(long, env = "WIFIFLOW_MODEL")]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = BedrockClient::from_env()?
        .with_retry_config(RetryConfig::with_max_attempts(WORKFLOW_MAX_ATTEMPTS));
    let mut flow = WifiWorkflow::new(Arc::new(client));
    if let Some(model) = cli.model {
        flow = flow.with_model(model);
    }

    workflow::run_terminal(
        &mut flow,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;
    Ok(())
}

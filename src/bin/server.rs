//! Websocket server for the computer use agent.
//!
//! Serves `GET /ws` (one conversation per connection) and `GET /health`.
//! The backend is chosen with `API_PROVIDER`; the Anthropic key comes from
//! `~/.anthropic/api_key` or `ANTHROPIC_API_KEY`.

use clap::Parser;
use computer_use::config::{self, ApiProvider, DEFAULT_MAX_TOKENS};
use computer_use::context::ImageRetention;
use computer_use::prompt;
use computer_use::provider::client_for;
use computer_use::server::{self, AppState, SessionConfig};
use computer_use::tools::ToolCollection;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "computer-use-server",
    about = "Websocket bridge between a browser chat and the computer use agent",
    version
)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8501)]
    port: u16,

    /// Model name (defaults to the provider's default)
    #[arg(long, env = "MODEL")]
    model: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Keep only this many screenshots in history (non-caching providers)
    #[arg(long)]
    only_n_most_recent_images: Option<usize>,

    /// Replace the built-in system prompt with the contents of this file
    #[arg(long)]
    system_prompt_file: Option<PathBuf>,

    /// Extra instructions appended to the system prompt
    #[arg(long, env = "SYSTEM_PROMPT_SUFFIX")]
    system_prompt_suffix: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let provider = ApiProvider::from_env()?;
    let client = client_for(provider, config::resolve_api_key())?;

    // Fail at startup rather than per connection when the display is unset
    ToolCollection::computer_use()?;

    let template = match &cli.system_prompt_file {
        Some(path) => std::fs::read_to_string(path).map_err(|source| config::ConfigError::Io {
            path: path.clone(),
            source,
        })?,
        None => prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let session = SessionConfig {
        system_prompt: prompt::system_prompt(&template, cli.system_prompt_suffix.as_deref()),
        model: cli
            .model
            .unwrap_or_else(|| provider.default_model().to_string()),
        max_tokens: cli.max_tokens,
        image_retention: cli.only_n_most_recent_images.map(ImageRetention::new),
    };
    info!(%provider, model = %session.model, "starting computer use server");

    let addr = format!("{}:{}", cli.host, cli.port);
    server::serve(&addr, AppState::new(client, session)).await?;
    Ok(())
}

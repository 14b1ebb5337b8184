//! Provider selection, default models, and credential lookup.
//!
//! Credentials resolve in order: a key stored under `~/.anthropic/`, then the
//! environment. The backend is chosen with `API_PROVIDER`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

pub const CONFIG_DIR_NAME: &str = ".anthropic";
pub const API_KEY_FILE: &str = "api_key";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Which hosted endpoint serves the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    #[default]
    Anthropic,
    Bedrock,
    Vertex,
}

impl ApiProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Bedrock => "anthropic.claude-3-5-sonnet-20241022-v2:0",
            Self::Vertex => "claude-3-5-sonnet-v2@20241022",
        }
    }

    /// Only the first-party endpoint gets prompt-caching breakpoints.
    pub fn supports_prompt_caching(&self) -> bool {
        matches!(self, Self::Anthropic)
    }

    /// Read `API_PROVIDER`, defaulting to Anthropic when unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("API_PROVIDER") {
            Ok(v) if !v.trim().is_empty() => v.parse(),
            _ => Ok(Self::Anthropic),
        }
    }
}

impl fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Bedrock => write!(f, "bedrock"),
            Self::Vertex => write!(f, "vertex"),
        }
    }
}

impl FromStr for ApiProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "bedrock" => Ok(Self::Bedrock),
            "vertex" => Ok(Self::Vertex),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown API provider: {0} (expected anthropic, bedrock or vertex)")]
    UnknownProvider(String),
    #[error("Missing configuration: {0}")]
    Missing(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `~/.anthropic`, if a home directory is known.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// Load a trimmed, non-empty value stored under `dir/filename`.
pub fn load_from_dir(dir: &std::path::Path, filename: &str) -> Option<String> {
    let path = dir.join(filename);
    match std::fs::read_to_string(&path) {
        Ok(data) => {
            let data = data.trim();
            (!data.is_empty()).then(|| data.to_string())
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Error loading stored value");
            }
            None
        }
    }
}

/// Load a value stored under `~/.anthropic/`.
pub fn load_from_storage(filename: &str) -> Option<String> {
    config_dir().and_then(|dir| load_from_dir(&dir, filename))
}

/// Stored key first, then `ANTHROPIC_API_KEY`. Empty when neither is set.
pub fn resolve_api_key() -> String {
    load_from_storage(API_KEY_FILE)
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .unwrap_or_default()
}

/// Read a required environment variable.
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(format!("environment variable {name}"))),
    }
}

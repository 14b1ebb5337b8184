//! Bash tool — a persistent shell session the model can drive.
//!
//! Each command is written to a long-lived `/bin/bash` followed by a sentinel
//! echo; output is collected until the sentinel shows up on stdout. State such
//! as the working directory and exported variables survives between calls.

use super::run::maybe_truncate;
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

const SENTINEL: &str = "<<exit>>";
const OUTPUT_POLL: Duration = Duration::from_millis(200);

type Buffer = Arc<Mutex<Vec<u8>>>;

struct BashSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Buffer,
    stderr: Buffer,
    timed_out: bool,
}

impl BashSession {
    fn start(cwd: Option<&str>) -> Result<Self, ToolError> {
        let mut cmd = Command::new("/bin/bash");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::Failed(format!("Failed to start bash: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Failed("bash stdin unavailable".into()))?;
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Failed("bash stdout unavailable".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Failed("bash stderr unavailable".into()))?;

        let stdout = Buffer::default();
        let stderr = Buffer::default();
        tokio::spawn(pump(stdout_pipe, stdout.clone()));
        tokio::spawn(pump(stderr_pipe, stderr.clone()));
        debug!("bash session started");

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            timed_out: false,
        })
    }

    async fn run(&mut self, command: &str, timeout: Duration) -> Result<ToolResult, ToolError> {
        if self.timed_out {
            return Err(ToolError::Failed(format!(
                "timed out: bash has not returned in {} seconds and must be restarted",
                timeout.as_secs()
            )));
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            return Ok(ToolResult::error(format!(
                "bash has exited with returncode {}",
                status.code().unwrap_or(-1)
            ))
            .with_system("tool must be restarted"));
        }

        let line = format!("{}; echo '{}'\n", command, SENTINEL);
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to write to bash: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to write to bash: {}", e)))?;

        let stdout = self.stdout.clone();
        let wait_for_sentinel = async move {
            loop {
                tokio::time::sleep(OUTPUT_POLL).await;
                let text = drain_until_sentinel(&stdout);
                if let Some(text) = text {
                    return text;
                }
            }
        };

        let output = match tokio::time::timeout(timeout, wait_for_sentinel).await {
            Ok(output) => output,
            Err(_) => {
                self.timed_out = true;
                warn!(command, "bash command timed out");
                return Err(ToolError::Failed(format!(
                    "timed out: bash has not returned in {} seconds and must be restarted",
                    timeout.as_secs()
                )));
            }
        };

        let error = take_all(&self.stderr);
        Ok(ToolResult {
            output: Some(strip_trailing_newline(output)),
            error: Some(strip_trailing_newline(error)),
            ..Default::default()
        })
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "bash session already gone");
        }
    }
}

async fn pump(mut pipe: impl AsyncRead + Unpin, buffer: Buffer) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

/// Return everything before the sentinel and clear the buffer, or `None`
/// if the sentinel has not arrived yet.
fn drain_until_sentinel(buffer: &Buffer) -> Option<String> {
    let mut buf = buffer.lock().ok()?;
    let text = String::from_utf8_lossy(&buf).to_string();
    let idx = text.find(SENTINEL)?;
    buf.clear();
    Some(text[..idx].to_string())
}

fn take_all(buffer: &Buffer) -> String {
    match buffer.lock() {
        Ok(mut buf) => {
            let text = String::from_utf8_lossy(&buf).to_string();
            buf.clear();
            text
        }
        Err(_) => String::new(),
    }
}

fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
    }
    text
}

#[derive(Debug, Deserialize)]
struct BashInput {
    command: Option<String>,
    #[serde(default)]
    restart: bool,
}

/// Run commands in a persistent bash session. Captures stdout and stderr.
pub struct BashTool {
    /// Working directory for the session
    pub cwd: Option<String>,
    /// Max time a single command may take before the session is abandoned
    pub timeout: Duration,
    /// Max output bytes returned per stream
    pub max_output_bytes: usize,
    session: tokio::sync::Mutex<Option<BashSession>>,
}

impl Default for BashTool {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(120),
            max_output_bytes: 256 * 1024, // 256KB
            session: tokio::sync::Mutex::new(None),
        }
    }
}

impl BashTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AgentTool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn to_param(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "bash_20241022",
            "name": "bash",
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError> {
        let input: BashInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;

        let mut guard = self.session.lock().await;

        if input.restart {
            if let Some(mut old) = guard.take() {
                old.stop();
            }
            *guard = Some(BashSession::start(self.cwd.as_deref())?);
            return Ok(ToolResult::default().with_system("tool has been restarted."));
        }

        if guard.is_none() {
            *guard = Some(BashSession::start(self.cwd.as_deref())?);
        }

        let Some(command) = input.command.filter(|c| !c.trim().is_empty()) else {
            return Err(ToolError::Failed("no command provided.".into()));
        };

        let session = guard
            .as_mut()
            .ok_or_else(|| ToolError::Failed("bash session unavailable".into()))?;
        let mut result = session.run(&command, self.timeout).await?;
        result.output = result
            .output
            .map(|o| maybe_truncate(&o, self.max_output_bytes));
        result.error = result
            .error
            .map(|e| maybe_truncate(&e, self.max_output_bytes));
        Ok(result)
    }
}

impl Drop for BashTool {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().as_mut() {
            session.stop();
        }
    }
}

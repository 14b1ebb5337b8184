//! Subprocess helper shared by the desktop tools.

use crate::types::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Longest tool response returned to the model.
pub const MAX_RESPONSE_LEN: usize = 16_000;

pub const TRUNCATED_MESSAGE: &str = "<response clipped><NOTE>To save on context only part of this file has been shown to you. You should retry this tool after you have searched inside the file with `grep -n` in order to find the line numbers of what you are looking for.</NOTE>";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Clip `content` to `max_len` bytes (on a char boundary) and append a notice.
pub fn maybe_truncate(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }
    let mut end = max_len;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &content[..end], TRUNCATED_MESSAGE)
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` and extra environment, capturing both streams.
/// The child is killed when the timeout elapses.
pub async fn run_command(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result
            .map_err(|e| ToolError::Failed(format!("Failed to execute {}: {}", program, e)))?,
        Err(_) => {
            return Err(ToolError::Failed(format!(
                "Command '{} {}' timed out after {} seconds",
                program,
                args.join(" "),
                timeout.as_secs()
            )))
        }
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: maybe_truncate(&String::from_utf8_lossy(&output.stdout), MAX_RESPONSE_LEN),
        stderr: maybe_truncate(&String::from_utf8_lossy(&output.stderr), MAX_RESPONSE_LEN),
    })
}

/// Whether `program` resolves to a file on `PATH`.
pub fn is_on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10); // 20 bytes
        let clipped = maybe_truncate(&text, 5);
        assert!(clipped.starts_with("éé"));
        assert!(clipped.ends_with(TRUNCATED_MESSAGE));
        assert_eq!(maybe_truncate("short", 100), "short");
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let out = run_command(
            "sh",
            &["-c".into(), "echo out; echo err >&2; exit 3".into()],
            &[],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[tokio::test]
    async fn times_out() {
        let err = run_command(
            "sleep",
            &["5".into()],
            &[],
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}

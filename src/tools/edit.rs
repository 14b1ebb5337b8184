//! Edit tool — view, create and surgically edit files by absolute path.
//!
//! Exposed to the model as `str_replace_editor`. Every mutating command
//! records the previous file content so `undo_edit` can restore it.

use super::run::{maybe_truncate, run_command, DEFAULT_TIMEOUT, MAX_RESPONSE_LEN};
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Lines of context shown around an edit.
pub const SNIPPET_LINES: usize = 4;

const TAB_WIDTH: usize = 8;

#[derive(Debug, Deserialize)]
struct EditInput {
    command: String,
    path: String,
    file_text: Option<String>,
    view_range: Option<Vec<serde_json::Value>>,
    old_str: Option<String>,
    new_str: Option<String>,
    insert_line: Option<i64>,
}

/// Filesystem editor with per-path undo history.
pub struct EditTool {
    file_history: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl Default for EditTool {
    fn default() -> Self {
        Self::new()
    }
}

impl EditTool {
    pub fn new() -> Self {
        Self {
            file_history: Mutex::new(HashMap::new()),
        }
    }

    async fn push_history(&self, path: &Path, content: String) {
        self.file_history
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .push(content);
    }

    async fn view(&self, path: &Path, view_range: Option<Vec<serde_json::Value>>) -> Result<ToolResult, ToolError> {
        if path.is_dir() {
            if view_range.is_some() {
                return Err(ToolError::Failed(
                    "The `view_range` parameter is not allowed when `path` points to a directory."
                        .into(),
                ));
            }
            let display = path.display().to_string();
            let out = run_command(
                "find",
                &[
                    display.clone(),
                    "-maxdepth".into(),
                    "2".into(),
                    "-not".into(),
                    "-path".into(),
                    "*/.*".into(),
                ],
                &[],
                DEFAULT_TIMEOUT,
            )
            .await?;
            let output = if out.stderr.is_empty() {
                format!(
                    "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
                    display, out.stdout
                )
            } else {
                out.stdout
            };
            return Ok(ToolResult {
                output: Some(output),
                error: Some(out.stderr).filter(|e| !e.is_empty()),
                ..Default::default()
            });
        }

        let file_content = read_file(path).await?;
        let mut init_line = 1;
        let mut content = file_content.clone();
        if let Some(range) = view_range {
            let bounds: Option<Vec<i64>> = range.iter().map(|v| v.as_i64()).collect();
            let Some([first, last]) = bounds.as_deref().and_then(|b| <[i64; 2]>::try_from(b).ok())
            else {
                return Err(ToolError::Failed(
                    "Invalid `view_range`. It should be a list of two integers.".into(),
                ));
            };
            let lines: Vec<&str> = file_content.split('\n').collect();
            let n_lines = lines.len() as i64;
            if first < 1 || first > n_lines {
                return Err(ToolError::Failed(format!(
                    "Invalid `view_range`: [{}, {}]. Its first element `{}` should be within the range of lines of the file: [1, {}]",
                    first, last, first, n_lines
                )));
            }
            if last > n_lines {
                return Err(ToolError::Failed(format!(
                    "Invalid `view_range`: [{}, {}]. Its second element `{}` should be smaller than the number of lines in the file: `{}`",
                    first, last, last, n_lines
                )));
            }
            if last != -1 && last < first {
                return Err(ToolError::Failed(format!(
                    "Invalid `view_range`: [{}, {}]. Its second element `{}` should be larger or equal than its first `{}`",
                    first, last, last, first
                )));
            }
            let start = (first - 1) as usize;
            let end = if last == -1 { lines.len() } else { last as usize };
            content = lines[start..end].join("\n");
            init_line = first as usize;
        }

        Ok(ToolResult::output(make_output(
            &content,
            &path.display().to_string(),
            init_line,
        )))
    }

    async fn create(&self, path: &Path, file_text: Option<String>) -> Result<ToolResult, ToolError> {
        let Some(file_text) = file_text else {
            return Err(ToolError::Failed(
                "Parameter `file_text` is required for command: create".into(),
            ));
        };
        write_file(path, &file_text).await?;
        self.push_history(path, file_text).await;
        Ok(ToolResult::output(format!(
            "File created successfully at: {}",
            path.display()
        )))
    }

    async fn str_replace(
        &self,
        path: &Path,
        old_str: Option<String>,
        new_str: Option<String>,
    ) -> Result<ToolResult, ToolError> {
        let Some(old_str) = old_str else {
            return Err(ToolError::Failed(
                "Parameter `old_str` is required for command: str_replace".into(),
            ));
        };
        let file_content = expand_tabs(&read_file(path).await?);
        let old_str = expand_tabs(&old_str);
        let new_str = expand_tabs(&new_str.unwrap_or_default());

        let occurrences = if old_str.is_empty() {
            0
        } else {
            file_content.matches(old_str.as_str()).count()
        };
        if occurrences == 0 {
            let mut msg = format!(
                "No replacement was performed, old_str `{}` did not appear verbatim in {}.",
                old_str,
                path.display()
            );
            if let Some(similar) = find_similar_text(&file_content, &old_str) {
                msg.push_str(&format!(" A similar region of the file is:\n{}", similar));
            }
            return Err(ToolError::Failed(msg));
        }
        if occurrences > 1 {
            let lines: Vec<usize> = file_content
                .split('\n')
                .enumerate()
                .filter(|(_, line)| line.contains(old_str.as_str()))
                .map(|(idx, _)| idx + 1)
                .collect();
            return Err(ToolError::Failed(format!(
                "No replacement was performed. Multiple occurrences of old_str `{}` in lines {:?}. Please ensure it is unique",
                old_str, lines
            )));
        }

        let new_file_content = file_content.replacen(old_str.as_str(), &new_str, 1);
        write_file(path, &new_file_content).await?;
        self.push_history(path, file_content.clone()).await;

        let replacement_line = file_content
            .split(old_str.as_str())
            .next()
            .unwrap_or_default()
            .matches('\n')
            .count();
        let start = replacement_line.saturating_sub(SNIPPET_LINES);
        let end = replacement_line + SNIPPET_LINES + new_str.matches('\n').count();
        let new_lines: Vec<&str> = new_file_content.split('\n').collect();
        let snippet = new_lines[start.min(new_lines.len())..(end + 1).min(new_lines.len())].join("\n");

        Ok(ToolResult::output(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected. Edit the file again if necessary.",
            path.display(),
            make_output(&snippet, &format!("a snippet of {}", path.display()), start + 1)
        )))
    }

    async fn insert(
        &self,
        path: &Path,
        insert_line: Option<i64>,
        new_str: Option<String>,
    ) -> Result<ToolResult, ToolError> {
        let Some(insert_line) = insert_line else {
            return Err(ToolError::Failed(
                "Parameter `insert_line` is required for command: insert".into(),
            ));
        };
        let Some(new_str) = new_str else {
            return Err(ToolError::Failed(
                "Parameter `new_str` is required for command: insert".into(),
            ));
        };
        let file_text = expand_tabs(&read_file(path).await?);
        let new_str = expand_tabs(&new_str);
        let lines: Vec<&str> = file_text.split('\n').collect();
        let n_lines = lines.len();

        if insert_line < 0 || insert_line as usize > n_lines {
            return Err(ToolError::Failed(format!(
                "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, {}]",
                insert_line, n_lines
            )));
        }
        let at = insert_line as usize;
        let new_str_lines: Vec<&str> = new_str.split('\n').collect();

        let mut new_lines = lines[..at].to_vec();
        new_lines.extend(&new_str_lines);
        new_lines.extend(&lines[at..]);

        let mut snippet_lines = lines[at.saturating_sub(SNIPPET_LINES)..at].to_vec();
        snippet_lines.extend(&new_str_lines);
        snippet_lines.extend(&lines[at..(at + SNIPPET_LINES).min(n_lines)]);

        write_file(path, &new_lines.join("\n")).await?;
        self.push_history(path, file_text.clone()).await;

        Ok(ToolResult::output(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.",
            path.display(),
            make_output(
                &snippet_lines.join("\n"),
                "a snippet of the edited file",
                (at + 1).saturating_sub(SNIPPET_LINES).max(1)
            )
        )))
    }

    async fn undo_edit(&self, path: &Path) -> Result<ToolResult, ToolError> {
        let previous = self
            .file_history
            .lock()
            .await
            .get_mut(path)
            .and_then(|h| h.pop());
        let Some(old_text) = previous else {
            return Err(ToolError::Failed(format!(
                "No edit history found for {}.",
                path.display()
            )));
        };
        write_file(path, &old_text).await?;
        Ok(ToolResult::output(format!(
            "Last edit to {} undone successfully. {}",
            path.display(),
            make_output(&old_text, &path.display().to_string(), 1)
        )))
    }
}

#[async_trait]
impl AgentTool for EditTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn to_param(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "text_editor_20241022",
            "name": "str_replace_editor",
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError> {
        let input: EditInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let path = PathBuf::from(&input.path);
        validate_path(&input.command, &path)?;

        match input.command.as_str() {
            "view" => self.view(&path, input.view_range).await,
            "create" => self.create(&path, input.file_text).await,
            "str_replace" => self.str_replace(&path, input.old_str, input.new_str).await,
            "insert" => self.insert(&path, input.insert_line, input.new_str).await,
            "undo_edit" => self.undo_edit(&path).await,
            other => Err(ToolError::Failed(format!(
                "Unrecognized command {}. The allowed commands for the {} tool are: view, create, str_replace, insert, undo_edit",
                other,
                self.name()
            ))),
        }
    }
}

fn validate_path(command: &str, path: &Path) -> Result<(), ToolError> {
    if !path.is_absolute() {
        return Err(ToolError::Failed(format!(
            "The path {} is not an absolute path, it should start with `/`. Maybe you meant {}?",
            path.display(),
            Path::new("/").join(path).display()
        )));
    }
    if !path.exists() && command != "create" {
        return Err(ToolError::Failed(format!(
            "The path {} does not exist. Please provide a valid path.",
            path.display()
        )));
    }
    if path.exists() && command == "create" {
        return Err(ToolError::Failed(format!(
            "File already exists at: {}. Cannot overwrite files using command `create`.",
            path.display()
        )));
    }
    if path.is_dir() && command != "view" {
        return Err(ToolError::Failed(format!(
            "The path {} is a directory and only the `view` command can be used on directories",
            path.display()
        )));
    }
    Ok(())
}

async fn read_file(path: &Path) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        ToolError::Failed(format!(
            "Ran into {} while trying to read {}",
            e,
            path.display()
        ))
    })
}

async fn write_file(path: &Path, content: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, content).await.map_err(|e| {
        ToolError::Failed(format!(
            "Ran into {} while trying to write to {}",
            e,
            path.display()
        ))
    })
}

/// `cat -n` style listing: six-wide line numbers starting at `init_line`.
fn make_output(file_content: &str, descriptor: &str, init_line: usize) -> String {
    let content = expand_tabs(&maybe_truncate(file_content, MAX_RESPONSE_LEN));
    let numbered: Vec<String> = content
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", i + init_line, line))
        .collect();
    format!(
        "Here's the result of running `cat -n` on {}:\n{}\n",
        descriptor,
        numbered.join("\n")
    )
}

/// Replace tabs with spaces up to the next multiple of [`TAB_WIDTH`],
/// column counting restarting at each newline.
fn expand_tabs(text: &str) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for ch in text.chars() {
        match ch {
            '\t' => {
                let pad = TAB_WIDTH - column % TAB_WIDTH;
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(ch);
                column = 0;
            }
            _ => {
                out.push(ch);
                column += 1;
            }
        }
    }
    out
}

/// Find the region that starts like `target` does, for a friendlier miss.
fn find_similar_text(content: &str, target: &str) -> Option<String> {
    let first_line = target.trim().lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }
    let lines: Vec<&str> = content.lines().collect();
    let i = lines.iter().position(|line| line.contains(first_line))?;
    let end = (i + target.trim().lines().count() + 1).min(lines.len());
    Some(lines[i..end].join("\n"))
}

//! Computer tool — screen, keyboard and mouse control of an X display.
//!
//! Every action shells out to `xdotool` (or a screenshot utility) against
//! the display named by `DISPLAY_NUM`. Coordinates exchanged with the model
//! live in a scaled-down space when the screen is larger than one of the
//! recommended resolutions; see [`ComputerTool::scale_coordinates`].

use super::run::{is_on_path, run_command, DEFAULT_TIMEOUT};
use crate::config::{require_env, ConfigError};
use crate::types::*;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const TYPING_DELAY_MS: u32 = 12;
const TYPING_GROUP_SIZE: usize = 50;
const ASPECT_RATIO_TOLERANCE: f64 = 0.02;

/// Resolutions the model is most accurate at, in preference order.
pub const MAX_SCALING_TARGETS: [(&str, u32, u32); 3] = [
    ("XGA", 1024, 768),
    ("WXGA", 1280, 800),
    ("FWXGA", 1366, 768),
];

/// Which coordinate space a pair of coordinates comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingSource {
    /// Real screen pixels, to be scaled down for the model.
    Computer,
    /// Model-space pixels, to be scaled up to the screen.
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
}

impl Action {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "key" => Self::Key,
            "type" => Self::Type,
            "mouse_move" => Self::MouseMove,
            "left_click" => Self::LeftClick,
            "left_click_drag" => Self::LeftClickDrag,
            "right_click" => Self::RightClick,
            "middle_click" => Self::MiddleClick,
            "double_click" => Self::DoubleClick,
            "screenshot" => Self::Screenshot,
            "cursor_position" => Self::CursorPosition,
            _ => return None,
        })
    }

    fn click_args(self) -> Option<&'static [&'static str]> {
        match self {
            Self::LeftClick => Some(&["click", "1"]),
            Self::RightClick => Some(&["click", "3"]),
            Self::MiddleClick => Some(&["click", "2"]),
            Self::DoubleClick => Some(&["click", "--repeat", "2", "--delay", "500", "1"]),
            _ => None,
        }
    }
}

/// Control the desktop: keys, typing, mouse, screenshots.
pub struct ComputerTool {
    pub width: u32,
    pub height: u32,
    pub display_num: Option<u32>,
    pub scaling_enabled: bool,
    /// Pause before the follow-up screenshot so the UI can settle.
    pub screenshot_delay: Duration,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl ComputerTool {
    pub fn new(width: u32, height: u32, display_num: Option<u32>) -> Self {
        Self {
            width,
            height,
            display_num,
            scaling_enabled: true,
            screenshot_delay: Duration::from_secs(2),
            output_dir: std::env::temp_dir().join("outputs"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read `WIDTH`, `HEIGHT` and the optional `DISPLAY_NUM` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let width = parse_env_u32("WIDTH")?;
        let height = parse_env_u32("HEIGHT")?;
        let display_num = match std::env::var("DISPLAY_NUM") {
            Ok(v) if !v.is_empty() => Some(parse_u32("DISPLAY_NUM", &v)?),
            _ => None,
        };
        Ok(Self::new(width, height, display_num))
    }

    pub fn with_scaling(mut self, enabled: bool) -> Self {
        self.scaling_enabled = enabled;
        self
    }

    pub fn with_screenshot_delay(mut self, delay: Duration) -> Self {
        self.screenshot_delay = delay;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The scaling target for this screen, if any recommended resolution
    /// shares its aspect ratio and is smaller.
    fn scaling_target(&self) -> Option<(u32, u32)> {
        if !self.scaling_enabled || self.height == 0 {
            return None;
        }
        let ratio = self.width as f64 / self.height as f64;
        let (_, w, h) = MAX_SCALING_TARGETS
            .iter()
            .find(|(_, w, h)| (*w as f64 / *h as f64 - ratio).abs() < ASPECT_RATIO_TOLERANCE)?;
        (*w < self.width).then_some((*w, *h))
    }

    /// Map coordinates between screen space and model space.
    ///
    /// Model-space input is bounds-checked against the dimensions advertised
    /// in [`AgentTool::to_param`].
    pub fn scale_coordinates(
        &self,
        source: ScalingSource,
        x: u32,
        y: u32,
    ) -> Result<(u32, u32), ToolError> {
        let target = self.scaling_target();
        if source == ScalingSource::Api {
            let (max_x, max_y) = target.unwrap_or((self.width, self.height));
            if x > max_x || y > max_y {
                return Err(ToolError::Failed(format!(
                    "Coordinates {}, {} are out of bounds",
                    x, y
                )));
            }
        }
        let Some((tw, th)) = target else {
            return Ok((x, y));
        };
        let x_factor = tw as f64 / self.width as f64;
        let y_factor = th as f64 / self.height as f64;
        Ok(match source {
            ScalingSource::Api => (
                (x as f64 / x_factor).round() as u32,
                (y as f64 / y_factor).round() as u32,
            ),
            ScalingSource::Computer => (
                (x as f64 * x_factor).round() as u32,
                (y as f64 * y_factor).round() as u32,
            ),
        })
    }

    fn display_env(&self) -> Vec<(String, String)> {
        match self.display_num {
            Some(n) => vec![("DISPLAY".into(), format!(":{}", n))],
            None => Vec::new(),
        }
    }

    /// Run one xdotool invocation, optionally followed by a screenshot.
    async fn xdotool(&self, args: Vec<String>, take_screenshot: bool) -> Result<ToolResult, ToolError> {
        debug!(?args, "xdotool");
        let out = run_command("xdotool", &args, &self.display_env(), self.timeout).await?;
        let mut result = ToolResult {
            output: Some(out.stdout).filter(|s| !s.is_empty()),
            error: Some(out.stderr).filter(|s| !s.is_empty()),
            ..Default::default()
        };
        if take_screenshot {
            tokio::time::sleep(self.screenshot_delay).await;
            result.base64_image = self.screenshot().await?.base64_image;
        }
        Ok(result)
    }

    /// Capture the screen, downscaled to the model-space resolution.
    pub async fn screenshot(&self) -> Result<ToolResult, ToolError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to create output dir: {}", e)))?;
        let path = self
            .output_dir
            .join(format!("screenshot_{}.png", uuid::Uuid::new_v4().simple()));
        let path_str = path.to_string_lossy().to_string();

        let (program, args) = if is_on_path("gnome-screenshot") {
            ("gnome-screenshot", vec!["-f".to_string(), path_str.clone(), "-p".into()])
        } else {
            ("scrot", vec!["-p".to_string(), path_str.clone()])
        };
        let out = run_command(program, &args, &self.display_env(), self.timeout).await?;

        if let Some((w, h)) = self.scaling_target() {
            run_command(
                "convert",
                &[
                    path_str.clone(),
                    "-resize".into(),
                    format!("{}x{}!", w, h),
                    path_str.clone(),
                ],
                &[],
                self.timeout,
            )
            .await?;
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(error = %e, "could not remove screenshot file");
                }
                Ok(ToolResult {
                    output: Some(out.stdout).filter(|s| !s.is_empty()),
                    error: Some(out.stderr).filter(|s| !s.is_empty()),
                    base64_image: Some(encoded),
                    system: None,
                })
            }
            Err(_) => Err(ToolError::Failed(format!(
                "Failed to take screenshot: {}",
                out.stderr
            ))),
        }
    }

    async fn cursor_position(&self) -> Result<ToolResult, ToolError> {
        let result = self
            .xdotool(vec!["getmouselocation".into(), "--shell".into()], false)
            .await?;
        let output = result.output.clone().unwrap_or_default();
        let field = |name: &str| -> Result<u32, ToolError> {
            output
                .lines()
                .find_map(|l| l.strip_prefix(name))
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| ToolError::Failed(format!("Failed to read cursor position: {}", output)))
        };
        let (x, y) = self.scale_coordinates(ScalingSource::Computer, field("X=")?, field("Y=")?)?;
        Ok(ToolResult {
            output: Some(format!("X={},Y={}", x, y)),
            ..result
        })
    }

    async fn type_text(&self, text: &str) -> Result<ToolResult, ToolError> {
        let chars: Vec<char> = text.chars().collect();
        let mut combined = ToolResult::default();
        for chunk in chars.chunks(TYPING_GROUP_SIZE) {
            let chunk: String = chunk.iter().collect();
            let step = self
                .xdotool(
                    vec![
                        "type".into(),
                        "--delay".into(),
                        TYPING_DELAY_MS.to_string(),
                        "--".into(),
                        chunk,
                    ],
                    false,
                )
                .await?;
            combined = combined.combine(step)?;
        }
        tokio::time::sleep(self.screenshot_delay).await;
        combined.base64_image = self.screenshot().await?.base64_image;
        Ok(combined)
    }
}

#[async_trait]
impl AgentTool for ComputerTool {
    fn name(&self) -> &str {
        "computer"
    }

    fn to_param(&self) -> Value {
        let (width, height) = self.scaling_target().unwrap_or((self.width, self.height));
        let mut param = serde_json::json!({
            "type": "computer_20241022",
            "name": "computer",
            "display_width_px": width,
            "display_height_px": height,
        });
        if let Some(n) = self.display_num {
            param["display_number"] = n.into();
        }
        param
    }

    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        let action_name = input["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgs("missing 'action' parameter".into()))?;
        let action = Action::parse(action_name)
            .ok_or_else(|| ToolError::Failed(format!("Invalid action: {}", action_name)))?;
        let text = input.get("text").filter(|v| !v.is_null());
        let coordinate = input.get("coordinate").filter(|v| !v.is_null());

        match action {
            Action::MouseMove | Action::LeftClickDrag => {
                let Some(coordinate) = coordinate else {
                    return Err(ToolError::Failed(format!(
                        "coordinate is required for {}",
                        action_name
                    )));
                };
                if text.is_some() {
                    return Err(ToolError::Failed(format!(
                        "text is not accepted for {}",
                        action_name
                    )));
                }
                let (x, y) = validate_coordinate(coordinate)?;
                let (x, y) = self.scale_coordinates(ScalingSource::Api, x, y)?;
                let args = if action == Action::MouseMove {
                    vec!["mousemove".into(), "--sync".into(), x.to_string(), y.to_string()]
                } else {
                    vec![
                        "mousedown".into(),
                        "1".into(),
                        "mousemove".into(),
                        "--sync".into(),
                        x.to_string(),
                        y.to_string(),
                        "mouseup".into(),
                        "1".into(),
                    ]
                };
                self.xdotool(args, true).await
            }
            Action::Key | Action::Type => {
                let Some(text) = text else {
                    return Err(ToolError::Failed(format!(
                        "text is required for {}",
                        action_name
                    )));
                };
                if coordinate.is_some() {
                    return Err(ToolError::Failed(format!(
                        "coordinate is not accepted for {}",
                        action_name
                    )));
                }
                let Some(text) = text.as_str() else {
                    return Err(ToolError::Failed(format!("{} must be a string", text)));
                };
                if action == Action::Key {
                    self.xdotool(key_args(text), true).await
                } else {
                    self.type_text(text).await
                }
            }
            Action::Screenshot | Action::CursorPosition => {
                if text.is_some() {
                    return Err(ToolError::Failed(format!(
                        "text is not accepted for {}",
                        action_name
                    )));
                }
                if coordinate.is_some() {
                    return Err(ToolError::Failed(format!(
                        "coordinate is not accepted for {}",
                        action_name
                    )));
                }
                if action == Action::Screenshot {
                    self.screenshot().await
                } else {
                    self.cursor_position().await
                }
            }
            Action::LeftClick | Action::RightClick | Action::MiddleClick | Action::DoubleClick => {
                if text.is_some() {
                    return Err(ToolError::Failed(format!(
                        "text is not accepted for {}",
                        action_name
                    )));
                }
                if coordinate.is_some() {
                    return Err(ToolError::Failed(format!(
                        "coordinate is not accepted for {}",
                        action_name
                    )));
                }
                let args = action
                    .click_args()
                    .unwrap_or_default()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                self.xdotool(args, true).await
            }
        }
    }
}

/// `xdotool key` arguments; whitespace separates keysyms (`"ctrl+a Return"`).
fn key_args(text: &str) -> Vec<String> {
    ["key", "--"]
        .into_iter()
        .map(String::from)
        .chain(text.split_whitespace().map(String::from))
        .collect()
}

fn validate_coordinate(value: &Value) -> Result<(u32, u32), ToolError> {
    let Some(pair) = value.as_array().filter(|a| a.len() == 2) else {
        return Err(ToolError::Failed(format!(
            "{} must be a tuple of length 2",
            value
        )));
    };
    match (pair[0].as_u64(), pair[1].as_u64()) {
        (Some(x), Some(y)) if x <= u32::MAX as u64 && y <= u32::MAX as u64 => {
            Ok((x as u32, y as u32))
        }
        _ => Err(ToolError::Failed(format!(
            "{} must be a tuple of non-negative ints",
            value
        ))),
    }
}

fn parse_env_u32(name: &str) -> Result<u32, ConfigError> {
    let raw = require_env(name)?;
    parse_u32(name, &raw)
}

fn parse_u32(name: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a positive integer, got {:?}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(width: u32, height: u32) -> ComputerTool {
        ComputerTool::new(width, height, Some(1))
    }

    #[test]
    fn key_sequence_splits_into_keysyms() {
        assert_eq!(key_args("ctrl+a Return"), vec!["key", "--", "ctrl+a", "Return"]);
        assert_eq!(key_args("Return"), vec!["key", "--", "Return"]);
    }

    #[test]
    fn scales_16_by_10_screen_to_wxga() {
        let t = tool(1920, 1200);
        assert_eq!(
            t.scale_coordinates(ScalingSource::Computer, 1920, 1200).unwrap(),
            (1280, 800)
        );
        assert_eq!(
            t.scale_coordinates(ScalingSource::Api, 640, 400).unwrap(),
            (960, 600)
        );
        let param = t.to_param();
        assert_eq!(param["display_width_px"], 1280);
        assert_eq!(param["display_height_px"], 800);
        assert_eq!(param["display_number"], 1);
    }

    #[test]
    fn screen_at_target_size_is_not_scaled() {
        let t = tool(1024, 768);
        assert_eq!(
            t.scale_coordinates(ScalingSource::Api, 100, 200).unwrap(),
            (100, 200)
        );
        assert_eq!(t.to_param()["display_width_px"], 1024);
    }

    #[test]
    fn unusual_aspect_ratio_is_not_scaled() {
        let t = tool(3000, 1000);
        assert!(t.scaling_target().is_none());
    }

    #[test]
    fn model_coordinates_out_of_bounds_are_rejected() {
        let t = tool(1920, 1200);
        let err = t
            .scale_coordinates(ScalingSource::Api, 1500, 10)
            .unwrap_err();
        assert_eq!(err.to_string(), "Coordinates 1500, 10 are out of bounds");
    }

    #[test]
    fn scaling_can_be_disabled() {
        let t = tool(1920, 1200).with_scaling(false);
        assert_eq!(
            t.scale_coordinates(ScalingSource::Computer, 1920, 1200).unwrap(),
            (1920, 1200)
        );
    }

    #[test]
    fn coordinate_validation() {
        assert_eq!(validate_coordinate(&json!([3, 4])).unwrap(), (3, 4));
        assert!(validate_coordinate(&json!([3]))
            .unwrap_err()
            .to_string()
            .contains("tuple of length 2"));
        assert!(validate_coordinate(&json!([-1, 4]))
            .unwrap_err()
            .to_string()
            .contains("non-negative ints"));
        assert!(validate_coordinate(&json!("10,20")).is_err());
    }

    #[tokio::test]
    async fn argument_errors_surface_before_any_command_runs() {
        let t = tool(1024, 768);
        let cases = [
            (json!({"action": "mouse_move"}), "coordinate is required for mouse_move"),
            (
                json!({"action": "mouse_move", "coordinate": [1, 2], "text": "x"}),
                "text is not accepted for mouse_move",
            ),
            (json!({"action": "type"}), "text is required for type"),
            (
                json!({"action": "key", "text": "a", "coordinate": [1, 1]}),
                "coordinate is not accepted for key",
            ),
            (json!({"action": "key", "text": 5}), "5 must be a string"),
            (
                json!({"action": "screenshot", "text": "x"}),
                "text is not accepted for screenshot",
            ),
            (
                json!({"action": "left_click", "coordinate": [1, 1]}),
                "coordinate is not accepted for left_click",
            ),
            (json!({"action": "wave"}), "Invalid action: wave"),
        ];
        for (input, expected) in cases {
            let err = t.execute(input).await.unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }
}

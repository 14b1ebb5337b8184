//! System prompt for the computer use agent.

use chrono::{DateTime, Local};

/// Built-in IT support persona script. `{arch}` and `{date}` are filled in
/// by [`render`].
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/it_support.txt");

/// Fill the placeholders of `template` for `arch` and `now`.
pub fn render(template: &str, arch: &str, now: DateTime<Local>) -> String {
    template
        .trim_end()
        .replace("{arch}", arch)
        .replace("{date}", &now.format("%A, %B %-d, %Y").to_string())
}

/// The prompt for this host and today, with an optional suffix appended
/// after a single space.
pub fn system_prompt(template: &str, suffix: Option<&str>) -> String {
    let prompt = render(template, std::env::consts::ARCH, Local::now());
    match suffix.map(str::trim).filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{} {}", prompt, suffix),
        None => prompt,
    }
}

use crate::error::ProbeError;
use serde_json::Value;
use std::fmt::Display;
use std::io::Write;

/// Writes one line of command output; write errors are only logged.
pub fn emit(out: &mut dyn Write, line: impl Display) {
    if let Err(e) = writeln!(out, "{line}") {
        tracing::debug!("Failed to write output: {e}");
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let boundary = s.floor_char_boundary(max);
        format!("{}... (truncated)", &s[..boundary])
    }
}

/// Strings print bare; everything else prints as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn field_line(name: &str, value: &Value) -> String {
    format!("  {name}: {}", render_value(value))
}

pub fn ok_line(summary: &str) -> String {
    format!("OK: {summary}")
}

pub fn failed_line(err: &ProbeError) -> String {
    format!("FAILED: {err}")
}

pub fn usage_hint() -> &'static str {
    "Run `meetbot-probe --help` for usage."
}

/// Formats one entry of a `bots[]` listing.
pub fn bot_line(id: &str, meeting_url: Option<&str>, runtime_secs: Option<u64>) -> String {
    let mut line = format!("  {id}");
    if let Some(url) = meeting_url {
        line.push_str(&format!("  {url}"));
    }
    if let Some(secs) = runtime_secs {
        line.push_str(&format!("  ({})", format_duration(secs)));
    }
    line
}

pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Last `n` lines of `text`, trailing blank lines ignored.
pub fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

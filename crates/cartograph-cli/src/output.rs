//! Shared output layer: every command renders in one of three modes.
//!
//! The mode comes from [`cartograph_core::config::resolve_config`]:
//! `--json` > `CARTOGRAPH_FORMAT` > user config `output` > pretty on a TTY,
//! text when piped.

use std::io::{self, Write};

use cartograph_core::ErrorCode;
use serde::Serialize;

/// Shared width for pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Left-aligned key/value line.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sections and aligned fields for people.
    Pretty,
    /// Tab-separated rows for pipes.
    Text,
    /// One pretty-printed JSON document.
    Json,
}

impl OutputMode {
    /// Map a resolved mode name (`pretty`, `text`, `json`); anything else is
    /// pretty.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render `value` to stdout: serialized in JSON mode, otherwise through
/// `text_fn` or `pretty_fn`.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    // Some commands exit right after rendering.
    out.flush()?;
    Ok(())
}

/// A failure as reported to the user.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_owned),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
        writeln!(out)?;
        return Ok(());
    }
    match &error.error_code {
        Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
        None => writeln!(out, "error: {}", error.message)?,
    }
    if let Some(suggestion) = &error.suggestion {
        writeln!(out, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_resolved("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_resolved("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_resolved("pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::from_resolved("weird"), OutputMode::Pretty);
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "cursor", "3 of 5").expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "cursor:      3 of 5\n");
    }

    #[test]
    fn pretty_section_draws_a_rule() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "Edits").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Edits\n"));
        assert!(text.trim_end().ends_with(&"-".repeat(PRETTY_RULE_WIDTH)));
    }

    #[test]
    fn coded_errors_carry_hints() {
        let err = CliError::with_code("bad file", ErrorCode::CorruptHistory);
        assert_eq!(err.error_code.as_deref(), Some("E3002"));
        assert!(err.suggestion.is_some());
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["error_code"], "E3002");
    }

    #[test]
    fn plain_errors_skip_empty_fields() {
        let json = serde_json::to_value(CliError::new("boom")).expect("serialize");
        assert_eq!(json, serde_json::json!({ "message": "boom" }));
    }
}

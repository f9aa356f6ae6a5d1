//! Shared helpers for command handlers.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// `YYYY-MM-DD HH:MM` or empty.
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Aligned `Label: value` lines for single-record views.
pub fn detail_block(fields: &[(&str, String)]) -> String {
    let width = fields.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 1;
    let mut out = String::new();
    for (i, (label, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let value = if value.is_empty() { "-" } else { value };
        let _ = write!(out, "{:<width$} {value}", format!("{label}:"));
    }
    out
}

/// Reject patches that would send an empty body.
pub fn require_changes(any_set: bool) -> Result<(), CliError> {
    if any_set {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: "update".into(),
            reason: "pass at least one field to change".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_block_aligns_labels_and_marks_empty_values() {
        let out = detail_block(&[("ID", "o1".into()), ("Address", String::new())]);
        assert_eq!(out, "ID:      o1\nAddress: -");
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(require_changes(false).is_err());
        assert!(require_changes(true).is_ok());
    }
}

//! Duplicate badfile: append-only text, one rejected tuple per line,
//! fields comma-separated with the quoting rule from spec.md §6.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::DlResult;

const NEEDS_QUOTING: &[char] = &['"', '\\', '(', ')', ',', ' ', '\t', '\n', '\r'];

/// Emits a field unquoted if it contains none of `" \ ( ) ,` and no
/// whitespace and is non-empty; otherwise double-quoted with embedded
/// `"` and `\` doubled.
pub fn format_field(field: &str) -> String {
    let needs_quoting =
        field.is_empty() || field.chars().any(|c| NEEDS_QUOTING.contains(&c));
    if !needs_quoting {
        return field.to_string();
    }
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub fn format_record(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

pub struct BadFile;

impl BadFile {
    pub fn append(path: &Path, fields: &[String]) -> DlResult<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", format_record(fields))?;
        Ok(())
    }
}

//! Lines-of-code counting for crate sources and expanded output.
//!
//! A line counts when, after block comments are removed, it is non-blank and
//! does not start with `//`. Doc comments therefore do not count either.
//! Comment markers inside string and char literals or after `//` are text.
//! Nested block comments are not tracked.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;

use crate::error::{IoResultExt, MacrostatResult};

/// Matches, leftmost first: raw strings, strings, char literals, line
/// comments and block comments. Only the last kind is stripped.
fn lexeme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // SAFETY: hardcoded pattern, covered by tests
    RE.get_or_init(|| {
        Regex::new(
            r##"(?s)r#"(?:.*?)"#|r"[^"]*"|"(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])'|//[^\n]*|/\*.*?\*/"##,
        )
        .expect("Hardcoded regex pattern is valid")
    })
}

/// Count lines of code in source text.
pub fn count_code_lines(content: &str) -> usize {
    let stripped = lexeme_regex().replace_all(content, |caps: &regex::Captures| {
        let lexeme = &caps[0];
        if !lexeme.starts_with("/*") {
            return lexeme.to_string();
        }
        // keep line structure so a comment ending mid-line does not merge lines
        "\n".repeat(lexeme.matches('\n').count())
    });

    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .count()
}

/// Count lines of code in one file.
pub fn count_file_lines(path: &Path) -> MacrostatResult<usize> {
    let content = fs::read_to_string(path).with_path(path)?;
    Ok(count_code_lines(&content))
}

/// Count lines of code across files in parallel.
///
/// Unreadable files are logged and contribute zero.
pub fn count_files_lines(files: &[PathBuf]) -> usize {
    files
        .par_iter()
        .map(|file| match count_file_lines(file) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "line count skipped");
                0
            }
        })
        .sum()
}

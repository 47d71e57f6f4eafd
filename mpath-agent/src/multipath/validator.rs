//! Configuration validation for multipath.conf.
//!
//! Checks that a file is ready for block insertion and that edited
//! content still has balanced braces before it is written back.

use std::path::Path;

use regex::Regex;
use thiserror::Error;

use super::editor::brace_delta;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("no multipaths section found in {0}; run the install flow first")]
    SectionNotFound(String),
    #[error("unbalanced braces: unexpected '}}' on line {0}")]
    UnexpectedClose(usize),
    #[error("unbalanced braces: {0} section(s) left open")]
    Unclosed(i32),
}

/// Validate that the config file has a `multipaths` section to insert into.
pub async fn validate_multipaths_section(config_path: impl AsRef<Path>) -> Result<(), ValidationError> {
    let path = config_path.as_ref();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ValidationError::FileNotFound(path.display().to_string()));
    }

    let content = tokio::fs::read_to_string(path).await?;

    let re = Regex::new(r"(?m)^\s*multipaths\s*\{").expect("Invalid regex pattern");

    if re.is_match(&content) {
        Ok(())
    } else {
        Err(ValidationError::SectionNotFound(path.display().to_string()))
    }
}

/// Check that braces balance and never close more than was opened.
pub fn check_balanced_braces(lines: &[String]) -> Result<(), ValidationError> {
    let mut depth = 0;
    for (idx, line) in lines.iter().enumerate() {
        depth += brace_delta(line);
        if depth < 0 {
            return Err(ValidationError::UnexpectedClose(idx + 1));
        }
    }
    if depth != 0 {
        return Err(ValidationError::Unclosed(depth));
    }
    Ok(())
}

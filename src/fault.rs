//! Fault-localization input.
//!
//! A fault file lists covered lines as `Class#line,score`, one per line.
//! Blank lines and lines starting with `#` are ignored. A repeated
//! `Class#line` keeps its first entry.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use mendtool_core::location::CoveredLine;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FaultError {
    #[error("failed to read fault file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected `Class#line,score`, got {text:?}")]
    Malformed { line: usize, text: String },
}

/// Split `Class#line` into its parts.
pub fn parse_location(text: &str) -> Option<(String, u32)> {
    let (class, line) = text.trim().rsplit_once('#')?;
    if class.is_empty() {
        return None;
    }
    let line: u32 = line.trim().parse().ok()?;
    Some((class.to_string(), line))
}

/// Parse fault-file content. A missing score counts as 1.0.
pub fn parse_fault_lines(content: &str) -> Result<Vec<CoveredLine>, FaultError> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let malformed = || FaultError::Malformed {
            line: i + 1,
            text: text.to_string(),
        };
        let (location, score) = match text.split_once(',') {
            Some((loc, score)) => {
                let score: f64 = score.trim().parse().map_err(|_| malformed())?;
                if score.is_nan() {
                    return Err(malformed());
                }
                (loc, score)
            }
            None => (text, 1.0),
        };
        let (class, line) = parse_location(location).ok_or_else(malformed)?;
        if seen.insert((class.clone(), line)) {
            lines.push(CoveredLine { class, line, score });
        }
    }
    debug!(lines = lines.len(), "parsed fault localization");
    Ok(lines)
}

pub fn load_fault_file(path: &Path) -> Result<Vec<CoveredLine>, FaultError> {
    let content = fs::read_to_string(path).map_err(|source| FaultError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_fault_lines(&content)
}

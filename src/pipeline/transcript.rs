//! Transcript assembly: ordered line results → `sectionN.txt`.
//!
//! Workers finish in whatever order the scheduler likes. Ordering is
//! restored here, from the line index each result carries, never from
//! arrival order.

use crate::error::TextbandError;
use crate::output::LineResult;
use std::fmt::Write as _;
use std::path::Path;

/// Line results of one section, sorted by line index.
#[derive(Debug, Clone)]
pub struct Transcript {
    section: usize,
    lines: Vec<LineResult>,
}

impl Transcript {
    /// Collect `results` (any order) into a transcript for `section`.
    pub fn from_results(section: usize, mut results: Vec<LineResult>) -> Self {
        results.sort_by_key(|r| r.index);
        Self {
            section,
            lines: results,
        }
    }

    pub fn section(&self) -> usize {
        self.section
    }

    pub fn lines(&self) -> &[LineResult] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<LineResult> {
        self.lines
    }

    /// One `lineM: text` row per line, failures as `lineM: [OCR failed: …]`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match &line.error {
                None => {
                    let _ = writeln!(out, "line{}: {}", line.index, line.text);
                }
                Some(failure) => {
                    let reason = single_row(&failure.to_string());
                    let _ = writeln!(out, "line{}: [OCR failed: {}]", line.index, reason);
                }
            }
        }
        out
    }

    /// Write the rendered transcript to `path` via temp file + rename.
    pub async fn write_to(&self, path: &Path) -> Result<(), TextbandError> {
        write_atomic(path, &self.render()).await
    }
}

/// Fold multi-row text (engine stderr) into one row, rows joined by ` | `.
fn single_row(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|row| !row.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Write `contents` to `path` so readers never observe a partial file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), TextbandError> {
    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| TextbandError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| TextbandError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

//! Output types: what segmentation hands to OCR and what OCR hands back.
//!
//! The [`Manifest`] is the contract between the two stages. Segmentation
//! produces it (and persists it as `manifest.json`); the dispatcher consumes
//! it. When both stages run in one process the manifest is passed directly
//! and the filesystem is never re-read to rediscover structure.

use crate::error::OcrFailure;
use crate::pipeline::regions::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One persisted line crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
    /// Zero-based position in vertical-script reading order.
    pub index: usize,
    /// `sectionN/textM.png`.
    pub path: PathBuf,
    /// Bounding box within the section crop. Absent when discovered by a
    /// directory scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// One persisted section crop and its lines, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    /// Zero-based position, top to bottom.
    pub index: usize,
    /// `sectionN.png`. Absent when discovered by a directory scan and the
    /// crop itself is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub lines: Vec<LineEntry>,
}

impl SectionEntry {
    /// Identifier used for the subdirectory and transcript: `sectionN`.
    pub fn name(&self) -> String {
        crate::pipeline::layout::section_name(self.index)
    }
}

/// Section → ordered line-image list for one analysed page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Directory every path in the manifest lives under.
    pub results_dir: PathBuf,
    /// Sections in ascending index order.
    pub sections: Vec<SectionEntry>,
}

impl Manifest {
    /// Total number of line images across all sections.
    pub fn line_count(&self) -> usize {
        self.sections.iter().map(|s| s.lines.len()).sum()
    }
}

/// Timing and count summary of a segmentation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationStats {
    pub page_width: u32,
    pub page_height: u32,
    /// Band candidates before the width filter.
    pub section_candidates: usize,
    pub sections: usize,
    /// Line candidates before the noise filter, summed over sections.
    pub line_candidates: usize,
    pub lines: usize,
    pub duration_ms: u64,
}

/// Result of [`crate::segment()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationOutput {
    pub manifest: Manifest,
    pub stats: SegmentationStats,
}

/// Outcome of recognising one line image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineResult {
    /// Index of the owning section.
    pub section: usize,
    /// Line index within the section (parsed from `textM.png`).
    pub index: usize,
    pub path: PathBuf,
    /// Cleaned recognised text; empty when `error` is set.
    pub text: String,
    /// Retry attempts used (0 when the first attempt succeeded).
    pub retries: u32,
    pub duration_ms: u64,
    /// Set when every attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OcrFailure>,
}

impl LineResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One written `sectionN.txt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub section: usize,
    pub path: PathBuf,
    /// Line results in ascending index order, exactly as written.
    pub lines: Vec<LineResult>,
}

impl TranscriptRecord {
    pub fn failed(&self) -> usize {
        self.lines.iter().filter(|l| !l.is_ok()).count()
    }
}

/// Count and timing summary of an OCR run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrStats {
    pub sections: usize,
    pub lines: usize,
    pub recognised: usize,
    pub failed: usize,
    /// Sum of retry attempts over all lines.
    pub retries: u64,
    pub duration_ms: u64,
}

/// Result of [`crate::recognise()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    pub transcripts: Vec<TranscriptRecord>,
    pub stats: OcrStats,
}

/// Result of [`crate::analyse()`]: both stages of one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub segmentation: SegmentationOutput,
    pub ocr: OcrOutput,
}

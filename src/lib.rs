//! # textband-ocr
//!
//! Cut scanned vertical-script pages into text lines and OCR them in
//! parallel, reassembling the output in reading order.
//!
//! ## Why this crate?
//!
//! Off-the-shelf OCR engines do poorly on whole pages of vertical Japanese
//! text laid out in several horizontal bands: columns of neighbouring bands
//! run together and the reading order (top band first, right column first)
//! is lost. This crate splits the page with two passes of classic
//! morphology (dilate, find contours, filter by width), hands each single
//! line image to the engine, and stitches the per-line text back together
//! in the right order no matter which worker finishes first.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image
//!  │
//!  ├─ 1. Sections  wide kernel → full-width bands, top to bottom
//!  ├─ 2. Lines     tall kernel → columns per band, right to left
//!  ├─ 3. Manifest  section → ordered line images (manifest.json)
//!  ├─ 4. OCR       bounded pool of tesseract subprocesses per section
//!  └─ 5. Output    sectionN.txt, `lineM: text` in reading order
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use textband_ocr::{analyse, OcrConfig, SegmentationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let output = analyse(
//!         "page.png",
//!         "results_page",
//!         &SegmentationConfig::default(),
//!         &OcrConfig::default(),
//!     )
//!     .await?;
//!     for t in &output.ocr.transcripts {
//!         println!("{}: {} lines", t.path.display(), t.lines.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Segmentation and OCR can also run separately: [`segment`] writes the
//! crops and `manifest.json`, and [`discover_manifest`] + [`recognise`]
//! pick them up later.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `textband` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! textband-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod segment;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    default_workers, Kernel, OcrConfig, OcrConfigBuilder, SegmentationConfig,
    SegmentationConfigBuilder, StageParams,
};
pub use dispatch::{analyse, analyse_with, recognise, recognise_sync, Dispatcher};
pub use error::{OcrFailure, TextbandError};
pub use output::{
    AnalysisOutput, LineEntry, LineResult, Manifest, OcrOutput, OcrStats, SectionEntry,
    SegmentationOutput, SegmentationStats, TranscriptRecord,
};
pub use pipeline::discover::discover_manifest;
pub use pipeline::engine::{OcrEngine, OcrTask, TesseractEngine};
pub use pipeline::layout::{default_results_dir, ResultsLayout};
pub use pipeline::regions::BoundingBox;
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use segment::{
    load_page, prepare_results_dir, segment, segment_image, segment_page, segment_sync,
};
pub use stream::{recognise_stream, LineStream};

//! Error types for the textband-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TextbandError`] — **Fatal**: the run cannot proceed at all (input
//!   image missing, worker pool misconfigured, results directory absent).
//!   Returned as `Err(TextbandError)` from [`crate::segment()`] and
//!   [`crate::recognise()`] before any output is written.
//!
//! * [`OcrFailure`] — **Non-fatal**: recognition of a single line image
//!   failed (engine crashed, timed out, image vanished) but every sibling
//!   line is fine. Stored inside [`crate::output::LineResult`] and rendered
//!   as a sentinel entry in the transcript, so a bad line never disappears
//!   silently and never takes the rest of the section down with it.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the textband-ocr library.
///
/// Per-line OCR failures use [`OcrFailure`] and are stored in
/// [`crate::output::LineResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum TextbandError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input image was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but could not be decoded as an image.
    #[error("Could not decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    // ── Results directory errors ──────────────────────────────────────────
    /// OCR mode was started on a results directory that does not exist.
    #[error("Results directory not found: '{path}'\nRun segmentation on the image first.")]
    ResultsDirMissing { path: PathBuf },

    /// `manifest.json` exists but cannot be parsed.
    #[error("Manifest '{path}' is invalid: {detail}")]
    ManifestInvalid { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a section crop, line crop or transcript.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image encoder refused to write a crop.
    #[error("Failed to encode image '{path}': {detail}")]
    ImageEncode { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The OCR worker pool would occupy every core of the host.
    #[error(
        "Worker pool of {workers} is not smaller than the host parallelism ({available}).\n\
Lower --workers to at most {max}.",
        max = .available.saturating_sub(1)
    )]
    WorkerPoolTooLarge { workers: usize, available: usize },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single line image.
///
/// Stored alongside [`crate::output::LineResult`] when recognition fails.
/// The section transcript is still written; the failed line shows up as an
/// explicit marker instead of blank text.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum OcrFailure {
    /// The line image was not on disk when the task ran.
    #[error("line image missing: {path}")]
    MissingImage { path: PathBuf },

    /// The OCR engine binary could not be started at all.
    #[error("OCR engine '{program}' unavailable: {detail}")]
    EngineUnavailable { program: String, detail: String },

    /// The OCR engine ran but exited unsuccessfully.
    #[error("OCR engine exited with {}: {stderr}", .exit_code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    EngineFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The OCR engine did not finish within the per-task timeout.
    #[error("OCR engine timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The OCR engine produced output that is not text.
    #[error("OCR engine produced malformed output: {detail}")]
    InvalidOutput { detail: String },
}

impl OcrFailure {
    /// Whether running the same task again could plausibly succeed.
    ///
    /// Process-level failures (crash, non-zero exit, timeout) are retried.
    /// Malformed input (missing image, undecodable output) and a missing
    /// engine binary are not: the next attempt would fail the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OcrFailure::EngineFailed { .. } | OcrFailure::Timeout { .. }
        )
    }
}

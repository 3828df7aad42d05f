//! Progress-callback trait for per-line OCR events.
//!
//! Inject an [`Arc<dyn OcrProgressCallback>`] via
//! [`crate::config::OcrConfigBuilder::progress_callback`] to receive events
//! as the dispatcher works through each section.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a log, or a
//! channel of their own without the library knowing how the host
//! application communicates. The trait is `Send + Sync` because line events
//! fire from concurrently running tasks.
//!
//! # Example
//!
//! ```rust
//! use textband_ocr::{OcrConfig, OcrProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl OcrProgressCallback for CountingCallback {
//!     fn on_line_complete(&self, section: usize, line: usize, chars: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("section{section}/text{line}: {chars} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: AtomicUsize::new(0),
//! });
//!
//! let config = OcrConfig::builder()
//!     .workers(1)
//!     .progress_callback(counter as Arc<dyn OcrProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the dispatcher as it recognises each line.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_line_start`, `on_line_complete` and `on_line_error` may be called
/// concurrently for lines of the same section. Protect shared mutable state
/// with `Mutex` or atomics.
pub trait OcrProgressCallback: Send + Sync {
    /// Called once before the first task is dispatched.
    fn on_run_start(&self, total_sections: usize, total_lines: usize) {
        let _ = (total_sections, total_lines);
    }

    /// Called just before the engine is invoked for a line.
    fn on_line_start(&self, section: usize, line: usize) {
        let _ = (section, line);
    }

    /// Called when a line is recognised.
    ///
    /// `chars` is the character count of the cleaned text.
    fn on_line_complete(&self, section: usize, line: usize, chars: usize) {
        let _ = (section, line, chars);
    }

    /// Called when a line fails after all retries are exhausted.
    fn on_line_error(&self, section: usize, line: usize, error: &str) {
        let _ = (section, line, error);
    }

    /// Called after a section's transcript has been written.
    fn on_section_complete(&self, section: usize, recognised: usize, failed: usize) {
        let _ = (section, recognised, failed);
    }

    /// Called once after every section has been attempted.
    fn on_run_complete(&self, total_lines: usize, recognised: usize) {
        let _ = (total_lines, recognised);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl OcrProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::OcrConfig`].
pub type ProgressCallback = Arc<dyn OcrProgressCallback>;

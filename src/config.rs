//! Configuration types for segmentation and OCR dispatch.
//!
//! Segmentation and recognition are configured separately because they run
//! separately: a page is usually segmented once, inspected, and only then
//! handed to OCR (possibly in a different process). Each stage gets its own
//! struct and builder:
//!
//! * [`SegmentationConfig`] — kernel shapes, width tolerances, threshold.
//! * [`OcrConfig`] — worker pool size, engine invocation, retry policy.
//!
//! # Pixel constants and page scale
//! Every pixel constant below was tuned against one scan resolution. Leave
//! [`SegmentationConfig::reference_width`] unset to use them verbatim, or set
//! it to the page width they were tuned for and every constant is rescaled by
//! `page_width / reference_width` when a page is processed.

use crate::error::TextbandError;
use crate::pipeline::engine::OcrEngine;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Largest kernel edge accepted by the dilation primitive.
pub const MAX_KERNEL_EDGE: u32 = 511;

/// Rectangular dilation kernel, `height` rows by `width` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    pub height: u32,
    pub width: u32,
}

impl Kernel {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Multiply both edges by `factor`, never dropping below one pixel or
    /// above [`MAX_KERNEL_EDGE`].
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            height: scale_px(self.height, factor).min(MAX_KERNEL_EDGE),
            width: scale_px(self.width, factor).min(MAX_KERNEL_EDGE),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

fn scale_px(px: u32, factor: f64) -> u32 {
    ((px as f64 * factor).round() as u32).max(1)
}

/// Configuration for page → sections → lines segmentation.
///
/// Built via [`SegmentationConfig::builder()`] or using
/// [`SegmentationConfig::default()`].
///
/// # Example
/// ```rust
/// use textband_ocr::{Kernel, SegmentationConfig};
///
/// let config = SegmentationConfig::builder()
///     .line_kernel(Kernel::new(20, 12))
///     .reference_width(2480)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Grayscale intensity at or below which a pixel counts as ink. Default: 127.
    pub threshold: u8,

    /// Dilation kernel for the section stage. Default: 10 rows × 100 columns.
    ///
    /// Wide enough to fuse every glyph of a band into one blob, short enough
    /// not to bridge the gap between neighbouring bands.
    pub section_kernel: Kernel,

    /// A band survives only if its width differs from the page width by less
    /// than this many pixels. Default: 600.
    pub section_width_tolerance: u32,

    /// Dilation kernel for the line stage. Default: 17 rows × 10 columns.
    ///
    /// Half the nominal glyph size tall (35 px glyphs at the reference scan),
    /// narrow enough to keep neighbouring columns apart.
    pub line_kernel: Kernel,

    /// Line candidates this wide or narrower are noise. Default: 30.
    pub line_min_width: u32,

    /// Page width the pixel constants were tuned for. Default: `None`
    /// (constants are used as absolute pixel counts).
    pub reference_width: Option<u32>,

    /// Write `sectionN_annotated.png` next to each section. Default: true.
    pub annotate: bool,

    /// Write the dilated masks and a page overlay to `<results>/debug/`. Default: false.
    pub debug_masks: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: 127,
            section_kernel: Kernel::new(10, 100),
            section_width_tolerance: 600,
            line_kernel: Kernel::new(17, 10),
            line_min_width: 30,
            reference_width: None,
            annotate: true,
            debug_masks: false,
        }
    }
}

/// Pixel parameters resolved for one concrete page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageParams {
    pub threshold: u8,
    pub section_kernel: Kernel,
    pub section_width_tolerance: u32,
    pub line_kernel: Kernel,
    pub line_min_width: u32,
}

impl SegmentationConfig {
    /// Create a new builder for `SegmentationConfig`.
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the pixel constants for a page `page_width` pixels wide.
    pub fn params_for(&self, page_width: u32) -> StageParams {
        let factor = match self.reference_width {
            Some(reference) if reference > 0 && page_width > 0 => {
                page_width as f64 / reference as f64
            }
            _ => 1.0,
        };
        StageParams {
            threshold: self.threshold,
            section_kernel: self.section_kernel.scaled(factor),
            section_width_tolerance: scale_px(self.section_width_tolerance, factor),
            line_kernel: self.line_kernel.scaled(factor),
            line_min_width: scale_px(self.line_min_width, factor),
        }
    }
}

/// Builder for [`SegmentationConfig`].
#[derive(Debug)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
}

impl SegmentationConfigBuilder {
    pub fn threshold(mut self, t: u8) -> Self {
        self.config.threshold = t;
        self
    }

    pub fn section_kernel(mut self, kernel: Kernel) -> Self {
        self.config.section_kernel = kernel;
        self
    }

    pub fn section_width_tolerance(mut self, px: u32) -> Self {
        self.config.section_width_tolerance = px;
        self
    }

    pub fn line_kernel(mut self, kernel: Kernel) -> Self {
        self.config.line_kernel = kernel;
        self
    }

    pub fn line_min_width(mut self, px: u32) -> Self {
        self.config.line_min_width = px;
        self
    }

    pub fn reference_width(mut self, px: u32) -> Self {
        self.config.reference_width = Some(px);
        self
    }

    pub fn annotate(mut self, v: bool) -> Self {
        self.config.annotate = v;
        self
    }

    pub fn debug_masks(mut self, v: bool) -> Self {
        self.config.debug_masks = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SegmentationConfig, TextbandError> {
        let c = &self.config;
        for (name, kernel) in [("section", c.section_kernel), ("line", c.line_kernel)] {
            if kernel.height == 0
                || kernel.width == 0
                || kernel.height > MAX_KERNEL_EDGE
                || kernel.width > MAX_KERNEL_EDGE
            {
                return Err(TextbandError::InvalidConfig(format!(
                    "{name} kernel must be 1–{MAX_KERNEL_EDGE} px per edge, got {kernel}"
                )));
            }
        }
        if c.section_width_tolerance == 0 {
            return Err(TextbandError::InvalidConfig(
                "Section width tolerance must be ≥ 1".into(),
            ));
        }
        if c.reference_width == Some(0) {
            return Err(TextbandError::InvalidConfig(
                "Reference width must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// Configuration for the OCR dispatcher.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use textband_ocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .workers(2)
///     .language("jpn_vert")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Number of concurrent OCR subprocesses. Default: `min(6, cores - 1)`.
    ///
    /// Must stay strictly below the host parallelism so the machine keeps a
    /// core for the dispatcher and the rest of the system; checked when a
    /// [`crate::Dispatcher`] is constructed.
    pub workers: usize,

    /// Engine language pack. Default: `jpn_vert`.
    pub language: String,

    /// Tesseract page segmentation mode. Default: 5 (single uniform block of
    /// vertically aligned text).
    pub page_seg_mode: u8,

    /// Engine executable. Default: `tesseract` (resolved via `PATH`).
    pub tesseract_program: String,

    /// Pre-constructed engine. Takes precedence over the tesseract fields.
    pub engine: Option<Arc<dyn OcrEngine>>,

    /// Maximum retries of a retryable per-line failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 250.
    pub retry_backoff_ms: u64,

    /// Per-invocation timeout in seconds. Default: `None` (wait forever).
    pub task_timeout_secs: Option<u64>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

/// Worker count that fits the host: six, or one less than the core count.
pub fn default_workers() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    available.saturating_sub(1).clamp(1, 6)
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            language: "jpn_vert".to_string(),
            page_seg_mode: 5,
            tesseract_program: "tesseract".to_string(),
            engine: None,
            max_retries: 2,
            retry_backoff_ms: 250,
            task_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("workers", &self.workers)
            .field("language", &self.language)
            .field("page_seg_mode", &self.page_seg_mode)
            .field("tesseract_program", &self.tesseract_program)
            .field("engine", &self.engine.as_ref().map(|e| e.name().to_string()))
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("task_timeout_secs", &self.task_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn OcrProgressCallback>"),
            )
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn page_seg_mode(mut self, psm: u8) -> Self {
        self.config.page_seg_mode = psm;
        self
    }

    pub fn tesseract_program(mut self, program: impl Into<String>) -> Self {
        self.config.tesseract_program = program.into();
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn task_timeout_secs(mut self, secs: u64) -> Self {
        self.config.task_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// The worker count is only checked against zero here; the comparison
    /// with host parallelism belongs to [`crate::Dispatcher::new`].
    pub fn build(self) -> Result<OcrConfig, TextbandError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(TextbandError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.language.trim().is_empty() {
            return Err(TextbandError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.task_timeout_secs == Some(0) {
            return Err(TextbandError::InvalidConfig(
                "Task timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scan() {
        let c = SegmentationConfig::default();
        assert_eq!(c.section_kernel, Kernel::new(10, 100));
        assert_eq!(c.line_kernel, Kernel::new(17, 10));
        assert_eq!(c.section_width_tolerance, 600);
        assert_eq!(c.line_min_width, 30);
        assert_eq!(c.threshold, 127);
    }

    #[test]
    fn params_are_fixed_without_reference_width() {
        let c = SegmentationConfig::default();
        let p = c.params_for(5000);
        assert_eq!(p.section_kernel, c.section_kernel);
        assert_eq!(p.line_min_width, 30);
    }

    #[test]
    fn params_scale_with_page_width() {
        let c = SegmentationConfig::builder()
            .reference_width(2000)
            .build()
            .unwrap();
        let p = c.params_for(1000);
        assert_eq!(p.section_kernel, Kernel::new(5, 50));
        assert_eq!(p.line_kernel, Kernel::new(9, 5));
        assert_eq!(p.section_width_tolerance, 300);
        assert_eq!(p.line_min_width, 15);
    }

    #[test]
    fn scaled_kernel_never_collapses() {
        assert_eq!(Kernel::new(2, 3).scaled(0.01), Kernel::new(1, 1));
        assert_eq!(
            Kernel::new(400, 400).scaled(4.0),
            Kernel::new(MAX_KERNEL_EDGE, MAX_KERNEL_EDGE)
        );
    }

    #[test]
    fn builder_rejects_empty_kernel() {
        let err = SegmentationConfig::builder()
            .line_kernel(Kernel::new(0, 10))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("line kernel"));
    }

    #[test]
    fn builder_rejects_oversized_kernel() {
        assert!(SegmentationConfig::builder()
            .section_kernel(Kernel::new(10, 600))
            .build()
            .is_err());
    }

    #[test]
    fn ocr_builder_rejects_zero_workers() {
        assert!(OcrConfig::builder().workers(0).build().is_err());
    }

    #[test]
    fn ocr_builder_accepts_overrides() {
        let c = OcrConfig::builder()
            .workers(3)
            .language("jpn")
            .page_seg_mode(6)
            .task_timeout_secs(30)
            .build()
            .unwrap();
        assert_eq!(c.workers, 3);
        assert_eq!(c.language, "jpn");
        assert_eq!(c.page_seg_mode, 6);
        assert_eq!(c.task_timeout_secs, Some(30));
    }

    #[test]
    fn default_workers_is_bounded() {
        let n = default_workers();
        assert!((1..=6).contains(&n));
    }

    #[test]
    fn ocr_debug_hides_trait_objects() {
        let s = format!("{:?}", OcrConfig::default());
        assert!(s.contains("jpn_vert"));
        assert!(s.contains("workers"));
    }
}

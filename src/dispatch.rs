//! OCR dispatch: manifest → one transcript per section.
//!
//! ## Concurrency model
//!
//! Sections are processed one after another. Within a section every line
//! image becomes an [`OcrTask`] and the tasks run on a bounded pool of
//! `workers` concurrent engine invocations (`buffer_unordered`). Results come
//! back in completion order, which carries no meaning:
//! once the section has drained they are sorted by line index and only then
//! written out.
//!
//! The pool must leave at least one core of the host free. That is checked
//! once, when the [`Dispatcher`] is built, so a misconfigured run fails
//! before any engine is started.

use crate::config::{OcrConfig, SegmentationConfig};
use crate::error::TextbandError;
use crate::output::{AnalysisOutput, LineResult, Manifest, OcrOutput, OcrStats, SectionEntry, TranscriptRecord};
use crate::pipeline::engine::{engine_for, recognise_line, OcrEngine, OcrTask};
use crate::pipeline::layout::ResultsLayout;
use crate::pipeline::transcript::Transcript;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A validated worker pool bound to one OCR engine.
pub struct Dispatcher {
    config: OcrConfig,
    engine: Arc<dyn OcrEngine>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.config.workers)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl Dispatcher {
    /// Build a dispatcher for this host.
    ///
    /// # Errors
    /// [`TextbandError::WorkerPoolTooLarge`] when `config.workers` is not
    /// strictly below the host's available parallelism.
    pub fn new(config: OcrConfig) -> Result<Self, TextbandError> {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_parallelism(config, available)
    }

    /// Build a dispatcher as if the host had `available` cores.
    pub fn with_parallelism(config: OcrConfig, available: usize) -> Result<Self, TextbandError> {
        if config.workers == 0 {
            return Err(TextbandError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if config.workers >= available {
            return Err(TextbandError::WorkerPoolTooLarge {
                workers: config.workers,
                available,
            });
        }
        let engine = engine_for(&config);
        debug!(
            "Dispatcher: {} workers of {} cores, engine {}",
            config.workers,
            available,
            engine.name()
        );
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub(crate) fn engine(&self) -> Arc<dyn OcrEngine> {
        Arc::clone(&self.engine)
    }

    /// Recognise every line of `manifest` and write `sectionN.txt` files.
    ///
    /// Returns `Ok` even when individual lines fail; those are counted in
    /// `stats.failed` and appear as sentinels in their transcript.
    pub async fn recognise(&self, manifest: &Manifest) -> Result<OcrOutput, TextbandError> {
        let start = Instant::now();
        let total_lines = manifest.line_count();
        info!(
            "Recognising {} lines in {} sections with {} workers",
            total_lines,
            manifest.sections.len(),
            self.config.workers
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(manifest.sections.len(), total_lines);
        }

        let layout = ResultsLayout::new(&manifest.results_dir);
        let mut transcripts = Vec::new();
        for section in &manifest.sections {
            if section.lines.is_empty() {
                debug!("Section {}: no lines, no transcript", section.index);
                continue;
            }
            let record = self
                .recognise_section(section, &layout.transcript(section.index))
                .await?;
            transcripts.push(record);
        }

        let lines = transcripts.iter().map(|t| t.lines.len()).sum::<usize>();
        let failed = transcripts.iter().map(TranscriptRecord::failed).sum::<usize>();
        let stats = OcrStats {
            sections: manifest.sections.len(),
            lines,
            recognised: lines - failed,
            failed,
            retries: transcripts
                .iter()
                .flat_map(|t| &t.lines)
                .map(|l| l.retries as u64)
                .sum(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "OCR complete: {}/{} lines, {} transcripts, {}ms",
            stats.recognised,
            stats.lines,
            transcripts.len(),
            stats.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(stats.lines, stats.recognised);
        }

        Ok(OcrOutput { transcripts, stats })
    }

    /// Recognise one section and write its transcript to `transcript_path`.
    pub async fn recognise_section(
        &self,
        section: &SectionEntry,
        transcript_path: &Path,
    ) -> Result<TranscriptRecord, TextbandError> {
        let tasks = tasks_for(section);
        let results: Vec<LineResult> = stream::iter(tasks.into_iter().map(|task| {
            let engine = Arc::clone(&self.engine);
            let config = self.config.clone();
            async move { run_task(engine.as_ref(), &task, &config).await }
        }))
        .buffer_unordered(self.config.workers)
        .collect()
        .await;

        let transcript = Transcript::from_results(section.index, results);
        transcript.write_to(transcript_path).await?;

        let lines = transcript.into_lines();
        let failed = lines.iter().filter(|l| !l.is_ok()).count();
        if failed > 0 {
            warn!(
                "Section {}: {} of {} lines failed",
                section.index,
                failed,
                lines.len()
            );
        }
        info!(
            "Section {} → {}",
            section.index,
            transcript_path.display()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_section_complete(section.index, lines.len() - failed, failed);
        }

        Ok(TranscriptRecord {
            section: section.index,
            path: transcript_path.to_path_buf(),
            lines,
        })
    }
}

/// One task per line of `section`, in manifest order.
pub(crate) fn tasks_for(section: &SectionEntry) -> Vec<OcrTask> {
    section
        .lines
        .iter()
        .map(|line| OcrTask {
            section: section.index,
            index: line.index,
            path: line.path.clone(),
        })
        .collect()
}

/// Run one task, reporting start and outcome to the progress callback.
pub(crate) async fn run_task(engine: &dyn OcrEngine, task: &OcrTask, config: &OcrConfig) -> LineResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_line_start(task.section, task.index);
    }
    let result = recognise_line(engine, task, config).await;
    if let Some(ref cb) = config.progress_callback {
        match &result.error {
            None => cb.on_line_complete(task.section, task.index, result.text.chars().count()),
            Some(e) => cb.on_line_error(task.section, task.index, &e.to_string()),
        }
    }
    result
}

/// Recognise every line of `manifest` with a dispatcher sized for this host.
///
/// # Errors
/// Fatal errors only: worker pool too large, a transcript not writable.
pub async fn recognise(manifest: &Manifest, config: &OcrConfig) -> Result<OcrOutput, TextbandError> {
    Dispatcher::new(config.clone())?.recognise(manifest).await
}

/// Synchronous wrapper around [`recognise`].
///
/// Creates a temporary tokio runtime internally.
pub fn recognise_sync(manifest: &Manifest, config: &OcrConfig) -> Result<OcrOutput, TextbandError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TextbandError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(recognise(manifest, config))
}

/// Segment `image_path` and recognise the result in one process.
///
/// The in-memory manifest goes straight to the dispatcher; the results
/// directory is never rescanned. The worker pool is validated before
/// segmentation starts.
pub async fn analyse(
    image_path: impl AsRef<Path>,
    results_dir: impl AsRef<Path>,
    segmentation: &SegmentationConfig,
    ocr: &OcrConfig,
) -> Result<AnalysisOutput, TextbandError> {
    let dispatcher = Dispatcher::new(ocr.clone())?;
    analyse_with(&dispatcher, image_path, results_dir, segmentation).await
}

/// [`analyse`] with a caller-built dispatcher.
pub async fn analyse_with(
    dispatcher: &Dispatcher,
    image_path: impl AsRef<Path>,
    results_dir: impl AsRef<Path>,
    segmentation: &SegmentationConfig,
) -> Result<AnalysisOutput, TextbandError> {
    let seg = crate::segment::segment(image_path, results_dir, segmentation).await?;
    let ocr = dispatcher.recognise(&seg.manifest).await?;
    Ok(AnalysisOutput {
        segmentation: seg,
        ocr,
    })
}

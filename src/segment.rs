//! Segmentation entry points: page image → section crops → line crops.
//!
//! All of segmentation is CPU-bound pixel work, so the async entry point
//! runs the whole pass inside `spawn_blocking` and only awaits the result.
//! [`segment_image`] is the synchronous core for callers that already hold
//! a decoded image.

use crate::config::SegmentationConfig;
use crate::error::TextbandError;
use crate::output::{LineEntry, Manifest, SectionEntry, SegmentationOutput, SegmentationStats};
use crate::pipeline::discover::write_manifest;
use crate::pipeline::layout::{ensure_dir, ResultsLayout};
use crate::pipeline::{input, lines, sections};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Segment the image at `image_path`, writing crops under `results_dir`.
///
/// The results directory is created if missing but not emptied; use
/// [`prepare_results_dir`] first for a clean run.
///
/// # Errors
/// Returns `Err(TextbandError)` only for fatal errors:
/// - Image not found / permission denied / not decodable
/// - A crop or the manifest could not be written
///
/// A page without any qualifying band is not an error: the output simply
/// holds an empty manifest.
pub async fn segment(
    image_path: impl AsRef<Path>,
    results_dir: impl AsRef<Path>,
    config: &SegmentationConfig,
) -> Result<SegmentationOutput, TextbandError> {
    let page = load_page(image_path).await?;
    segment_page(page, results_dir, config).await
}

/// Validate and decode the page at `image_path` off the async runtime.
///
/// Callers that clear the results directory do it after this succeeds, so
/// a bad input path never costs a previous run's output.
pub async fn load_page(image_path: impl AsRef<Path>) -> Result<DynamicImage, TextbandError> {
    let image_path = image_path.as_ref().to_path_buf();
    info!("Segmenting {}", image_path.display());
    tokio::task::spawn_blocking(move || input::load_image(&image_path))
        .await
        .map_err(|e| TextbandError::Internal(format!("image decode task panicked: {e}")))?
}

/// [`segment_image`] on a blocking thread, for an already decoded page.
pub async fn segment_page(
    page: DynamicImage,
    results_dir: impl AsRef<Path>,
    config: &SegmentationConfig,
) -> Result<SegmentationOutput, TextbandError> {
    let results_dir = results_dir.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || segment_image(&page, &results_dir, &config))
        .await
        .map_err(|e| TextbandError::Internal(format!("segmentation task panicked: {e}")))?
}

/// Synchronous counterpart of [`segment`]. Does not need a tokio runtime.
pub fn segment_sync(
    image_path: impl AsRef<Path>,
    results_dir: impl AsRef<Path>,
    config: &SegmentationConfig,
) -> Result<SegmentationOutput, TextbandError> {
    let page = input::load_image(image_path.as_ref())?;
    segment_image(&page, results_dir.as_ref(), config)
}

/// Segment an already decoded page.
pub fn segment_image(
    page: &DynamicImage,
    results_dir: &Path,
    config: &SegmentationConfig,
) -> Result<SegmentationOutput, TextbandError> {
    let start = Instant::now();
    ensure_dir(results_dir)?;
    let layout = ResultsLayout::new(results_dir);

    let params = config.params_for(page.width());
    debug!(
        "Page {}x{}: section kernel {}, line kernel {}",
        page.width(),
        page.height(),
        params.section_kernel,
        params.line_kernel
    );

    // ── Step 1: Page → sections ──────────────────────────────────────────
    let section_pass = sections::find_sections(page, &params, &layout, config.debug_masks)?;

    // ── Step 2: Each section → lines ─────────────────────────────────────
    let mut entries = Vec::with_capacity(section_pass.sections.len());
    let mut line_candidates = 0;
    for section in &section_pass.sections {
        let line_pass = lines::find_lines(
            section,
            &params,
            &layout,
            config.annotate,
            config.debug_masks,
        )?;
        line_candidates += line_pass.candidates;
        info!(
            "Section {}: {} lines",
            section.index,
            line_pass.lines.len()
        );

        entries.push(SectionEntry {
            index: section.index,
            image: Some(section.path.clone()),
            bbox: Some(section.bbox),
            lines: line_pass
                .lines
                .into_iter()
                .map(|l| LineEntry {
                    index: l.index,
                    path: l.path,
                    bbox: Some(l.bbox),
                })
                .collect(),
        });
    }

    // ── Step 3: Persist the manifest ─────────────────────────────────────
    let manifest = Manifest {
        results_dir: results_dir.to_path_buf(),
        sections: entries,
    };
    write_manifest(&manifest)?;

    let stats = SegmentationStats {
        page_width: page.width(),
        page_height: page.height(),
        section_candidates: section_pass.candidates,
        sections: manifest.sections.len(),
        line_candidates,
        lines: manifest.line_count(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Segmentation complete: {} sections, {} lines, {}ms",
        stats.sections, stats.lines, stats.duration_ms
    );

    Ok(SegmentationOutput { manifest, stats })
}

/// Remove `results_dir` if it exists and create it empty.
pub async fn prepare_results_dir(results_dir: impl AsRef<Path>) -> Result<PathBuf, TextbandError> {
    let dir = results_dir.as_ref().to_path_buf();
    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        debug!("Removing previous results in {}", dir.display());
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|source| TextbandError::OutputWriteFailed {
                path: dir.clone(),
                source,
            })?;
    }
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| TextbandError::OutputWriteFailed {
            path: dir.clone(),
            source,
        })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Two full-width bands, each holding twelve 40 px columns 40 px apart.
    fn synthetic_page() -> DynamicImage {
        let mut img = RgbImage::from_pixel(1000, 500, Rgb([255, 255, 255]));
        for (y0, y1) in [(60u32, 160u32), (300, 400)] {
            for k in 0..12u32 {
                let x0 = 20 + 80 * k;
                for y in y0..y1 {
                    for x in x0..x0 + 40 {
                        img.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn page_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = segment_image(&synthetic_page(), dir.path(), &SegmentationConfig::default())
            .unwrap();

        assert_eq!(out.stats.sections, 2);
        assert_eq!(out.stats.lines, 24);
        assert_eq!(out.manifest.line_count(), 24);
        for section in &out.manifest.sections {
            assert_eq!(section.lines.len(), 12);
            assert!(section.lines[0].bbox.unwrap().x > section.lines[1].bbox.unwrap().x);
            for line in &section.lines {
                assert!(line.path.exists());
            }
        }
        assert!(ResultsLayout::new(dir.path()).manifest().exists());
        assert!(ResultsLayout::new(dir.path()).section_annotated(1).exists());
    }

    #[test]
    fn blank_page_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([255, 255, 255])));
        let out = segment_image(&page, dir.path(), &SegmentationConfig::default()).unwrap();
        assert!(out.manifest.sections.is_empty());
        assert_eq!(out.stats.section_candidates, 0);
    }

    #[tokio::test]
    async fn segment_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page.png");
        synthetic_page().save(&image).unwrap();
        let results = dir.path().join("results_page");

        let out = segment(&image, &results, &SegmentationConfig::default())
            .await
            .unwrap();
        assert_eq!(out.manifest.results_dir, results);
        assert_eq!(out.stats.page_width, 1000);
    }

    #[tokio::test]
    async fn missing_image_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = segment(dir.path().join("nope.png"), dir.path(), &SegmentationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TextbandError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn prepare_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results_page");
        std::fs::create_dir_all(results.join("section0")).unwrap();
        std::fs::write(results.join("section0.txt"), "stale").unwrap();

        prepare_results_dir(&results).await.unwrap();
        assert!(results.is_dir());
        assert_eq!(std::fs::read_dir(&results).unwrap().count(), 0);
    }
}

//! Line stage: section → text lines in vertical-script reading order.
//!
//! Lines run top to bottom and are read right to left, so candidates are
//! sorted by descending right edge, with the bottom edge as tie-breaker.
//! Candidates no wider than the noise threshold (punctuation fragments,
//! ruby, speckle) are dropped before indices are assigned, so the
//! surviving indices are dense.

use crate::config::StageParams;
use crate::error::TextbandError;
use crate::pipeline::annotate::{annotate, Annotation, AnnotationStyle};
use crate::pipeline::layout::{ensure_dir, write_png, ResultsLayout};
use crate::pipeline::regions::{find_regions, BoundingBox, Frame, StagePlan};
use crate::pipeline::sections::Section;
use image::DynamicImage;
use std::path::PathBuf;
use tracing::debug;

/// One persisted text line.
#[derive(Debug, Clone)]
pub struct Line {
    /// Zero-based, reading order, reset per section.
    pub index: usize,
    /// Position within the section crop.
    pub bbox: BoundingBox,
    /// `sectionN/textM.png`.
    pub path: PathBuf,
}

/// Lines of one section plus how many candidates were considered.
#[derive(Debug)]
pub struct LinePass {
    pub lines: Vec<Line>,
    pub candidates: usize,
}

/// Split `section` into lines and persist each as `sectionN/textM.png`.
///
/// The section subdirectory is created only when at least one line
/// survives. With `annotate` set, `sectionN_annotated.png` is written
/// whatever the outcome.
pub fn find_lines(
    section: &Section,
    params: &StageParams,
    layout: &ResultsLayout,
    annotate_overlay: bool,
    debug_masks: bool,
) -> Result<LinePass, TextbandError> {
    let plan = StagePlan::lines(params);
    let frame = Frame::of(&section.image);

    let label = format!("section{}", section.index);
    let debug_dir = debug_masks.then(|| layout.debug_dir());
    let candidates = find_regions(
        &section.image,
        params.threshold,
        plan.kernel,
        plan.sort.as_ref(),
        debug_dir.as_deref().map(|d| (d, label.as_str())),
    );
    let candidate_count = candidates.len();
    let (kept, discarded) = plan.partition(candidates, frame);
    debug!(
        "Section {}: {} line candidates, {} kept by {}",
        section.index,
        candidate_count,
        kept.len(),
        plan.filter.name()
    );

    if !kept.is_empty() {
        ensure_dir(&layout.section_dir(section.index))?;
    }

    let mut lines = Vec::with_capacity(kept.len());
    for (index, region) in kept.iter().enumerate() {
        let b = region.bbox;
        let crop = section.image.crop_imm(b.x, b.y, b.width, b.height);
        let path = layout.line_image(section.index, index);
        write_png(&crop, &path)?;
        lines.push(Line {
            index,
            bbox: b,
            path,
        });
    }

    if annotate_overlay {
        let mut marks: Vec<Annotation> = lines
            .iter()
            .map(|l| Annotation::kept(l.bbox, l.index))
            .collect();
        marks.extend(discarded.iter().map(|r| Annotation::discarded(r.bbox)));
        let overlay = annotate(&section.image, &marks, AnnotationStyle::default());
        write_png(
            &DynamicImage::ImageRgb8(overlay),
            &layout.section_annotated(section.index),
        )?;
    }

    Ok(LinePass {
        lines,
        candidates: candidate_count,
    })
}

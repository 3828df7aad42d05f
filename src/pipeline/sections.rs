//! Section stage: page → full-width text bands, top to bottom.
//!
//! The section kernel is wide and short, so every glyph of a printed band
//! fuses into one blob while the blank gap between bands survives. Only
//! blobs spanning (nearly) the whole page width are real bands; headers,
//! page numbers, stamps and specks fall out on the width filter.

use crate::config::StageParams;
use crate::error::TextbandError;
use crate::pipeline::annotate::{annotate, Annotation, AnnotationStyle};
use crate::pipeline::layout::{ensure_dir, write_png, ResultsLayout};
use crate::pipeline::regions::{find_regions, BoundingBox, Frame, StagePlan};
use image::DynamicImage;
use std::path::PathBuf;
use tracing::{debug, info};

/// One persisted text band.
#[derive(Debug, Clone)]
pub struct Section {
    /// Zero-based, assigned top to bottom after filtering.
    pub index: usize,
    /// Position on the page.
    pub bbox: BoundingBox,
    /// Cropped pixels, kept for the line stage of the same pass.
    pub image: DynamicImage,
    /// `sectionN.png`.
    pub path: PathBuf,
}

/// Sections of one page plus how many candidates were considered.
#[derive(Debug)]
pub struct SectionPass {
    pub sections: Vec<Section>,
    pub candidates: usize,
}

/// Split `page` into sections and persist each crop as `sectionN.png`.
///
/// A page with no qualifying band returns an empty pass and writes nothing.
pub fn find_sections(
    page: &DynamicImage,
    params: &StageParams,
    layout: &ResultsLayout,
    debug_masks: bool,
) -> Result<SectionPass, TextbandError> {
    let plan = StagePlan::sections(params);
    let frame = Frame::of(page);

    let debug_dir = if debug_masks {
        let dir = layout.debug_dir();
        ensure_dir(&dir)?;
        Some(dir)
    } else {
        None
    };

    let candidates = find_regions(
        page,
        params.threshold,
        plan.kernel,
        plan.sort.as_ref(),
        debug_dir.as_deref().map(|d| (d, "page")),
    );
    let candidate_count = candidates.len();
    let (kept, discarded) = plan.partition(candidates, frame);
    debug!(
        "Sections: {} candidates, {} kept by {} (page width {})",
        candidate_count,
        kept.len(),
        plan.filter.name(),
        frame.width
    );

    let mut sections = Vec::with_capacity(kept.len());
    for (index, region) in kept.iter().enumerate() {
        let b = region.bbox;
        let image = page.crop_imm(b.x, b.y, b.width, b.height);
        let path = layout.section_image(index);
        write_png(&image, &path)?;
        debug!("Section {} at {:?} → {}", index, b, path.display());
        sections.push(Section {
            index,
            bbox: b,
            image,
            path,
        });
    }

    if let Some(dir) = debug_dir {
        let mut marks: Vec<Annotation> = sections
            .iter()
            .map(|s| Annotation::kept(s.bbox, s.index))
            .collect();
        marks.extend(discarded.iter().map(|r| Annotation::discarded(r.bbox)));
        let overlay = annotate(page, &marks, AnnotationStyle::default());
        write_png(&DynamicImage::ImageRgb8(overlay), &dir.join("page_annotated.png"))?;
    }

    info!("Found {} sections", sections.len());
    Ok(SectionPass {
        sections,
        candidates: candidate_count,
    })
}

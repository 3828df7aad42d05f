//! Debug overlays: bounding boxes and indices drawn over a copy of an image.
//!
//! Purely for human inspection. Nothing here feeds back into ordering or
//! the persisted crops.

use crate::pipeline::regions::BoundingBox;
use ab_glyph::FontVec;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use tracing::{debug, info};

/// Box colour for regions that were kept.
pub const KEPT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Box colour for regions a filter discarded.
pub const DISCARDED_COLOR: Rgb<u8> = Rgb([255, 160, 0]);

const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static LABEL_FONT: Lazy<Option<FontVec>> = Lazy::new(|| {
    for path in FONT_PATHS {
        if let Ok(data) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(data) {
                info!("Loaded annotation font: {}", path);
                return Some(font);
            }
        }
    }
    debug!("No system font found, annotation labels will be skipped");
    None
});

/// One box to draw, optionally labelled.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: Option<String>,
    pub color: Rgb<u8>,
}

impl Annotation {
    pub fn kept(bbox: BoundingBox, index: usize) -> Self {
        Self {
            bbox,
            label: Some(index.to_string()),
            color: KEPT_COLOR,
        }
    }

    pub fn discarded(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            label: None,
            color: DISCARDED_COLOR,
        }
    }
}

/// Overlay styling.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationStyle {
    /// Outline thickness in pixels. Default: 2.
    pub thickness: u32,
    /// Label glyph height in pixels. Default: 24.
    pub font_scale: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            font_scale: 24.0,
        }
    }
}

/// Draw `annotations` over an RGB copy of `img`.
///
/// Boxes are grown inward by `style.thickness` and clipped to the image.
/// Labels are drawn at the box centre when a system font is available.
pub fn annotate(img: &DynamicImage, annotations: &[Annotation], style: AnnotationStyle) -> RgbImage {
    let mut canvas = img.to_rgb8();
    let (w, h) = canvas.dimensions();

    for a in annotations {
        let b = a.bbox;
        if b.x >= w || b.y >= h || b.width == 0 || b.height == 0 {
            continue;
        }
        let bw = b.width.min(w - b.x);
        let bh = b.height.min(h - b.y);

        for t in 0..style.thickness {
            if 2 * t >= bw || 2 * t >= bh {
                break;
            }
            let rect = Rect::at((b.x + t) as i32, (b.y + t) as i32).of_size(bw - 2 * t, bh - 2 * t);
            draw_hollow_rect_mut(&mut canvas, rect, a.color);
        }

        if let (Some(label), Some(font)) = (&a.label, LABEL_FONT.as_ref()) {
            let cx = (b.x + bw / 2) as i32;
            let cy = (b.y + bh / 2) as i32;
            draw_text_mut(&mut canvas, LABEL_COLOR, cx, cy, style.font_scale, font, label);
        }
    }

    canvas
}

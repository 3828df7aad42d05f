//! Region finding: binarise → dilate → external contours → sort.
//!
//! This single primitive implements both segmentation stages. Only the
//! [`StagePlan`] differs: the dilation kernel decides what merges into one
//! region (a whole band, or one line), the [`SortKey`] decides reading order
//! and the [`RegionFilter`] decides what is noise.
//!
//! ## Kernel shape
//!
//! The kernel is the single most important tuning parameter. Wider than the
//! gap between glyphs and neighbouring regions fuse (fewer, larger regions);
//! narrower than the gap and every glyph fragment becomes its own region.
//! No kernel inference is attempted; callers pass shapes tuned to a known
//! page scale.

use crate::config::{Kernel, StageParams, MAX_KERNEL_EDGE};
use crate::pipeline::binarize::{binarize, BACKGROUND, FOREGROUND};
use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::morphology::{grayscale_dilate, Mask};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, warn};

/// Axis-aligned bounding box in pixels (`x`, `y` = top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, `x + width`.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge, `y + height`.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Smallest box enclosing every point. `None` for an empty slice.
    pub fn enclosing(points: &[Point<u32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }
}

/// Dimensions of the image a region was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn of(img: &DynamicImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
        }
    }
}

/// An external contour and its bounding box.
#[derive(Debug, Clone)]
pub struct Region {
    pub contour: Vec<Point<u32>>,
    pub bbox: BoundingBox,
}

// ── Strategies ───────────────────────────────────────────────────────────

/// Orders regions. Sorting is stable: equal keys keep encounter order.
pub trait SortKey: Send + Sync {
    fn compare(&self, a: &BoundingBox, b: &BoundingBox) -> Ordering;
    fn name(&self) -> &'static str;
}

/// Ascending top edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopToBottom;

impl SortKey for TopToBottom {
    fn compare(&self, a: &BoundingBox, b: &BoundingBox) -> Ordering {
        a.y.cmp(&b.y)
    }

    fn name(&self) -> &'static str {
        "top-to-bottom"
    }
}

/// Vertical-script reading order: descending right edge, ties broken by
/// descending bottom edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct RightToLeftBottomToTop;

impl SortKey for RightToLeftBottomToTop {
    fn compare(&self, a: &BoundingBox, b: &BoundingBox) -> Ordering {
        b.right()
            .cmp(&a.right())
            .then_with(|| b.bottom().cmp(&a.bottom()))
    }

    fn name(&self) -> &'static str {
        "right-to-left, bottom-to-top"
    }
}

/// Decides whether a region is kept.
pub trait RegionFilter: Send + Sync {
    fn keep(&self, bbox: &BoundingBox, frame: Frame) -> bool;
    fn name(&self) -> &'static str;
}

/// Keeps regions whose width is within `tolerance` (exclusive) of the frame width.
#[derive(Debug, Clone, Copy)]
pub struct WidthNearPage {
    pub tolerance: u32,
}

impl RegionFilter for WidthNearPage {
    fn keep(&self, bbox: &BoundingBox, frame: Frame) -> bool {
        bbox.width.abs_diff(frame.width) < self.tolerance
    }

    fn name(&self) -> &'static str {
        "width-near-page"
    }
}

/// Keeps regions strictly wider than `min_exclusive`.
#[derive(Debug, Clone, Copy)]
pub struct MinWidth {
    pub min_exclusive: u32,
}

impl RegionFilter for MinWidth {
    fn keep(&self, bbox: &BoundingBox, _frame: Frame) -> bool {
        bbox.width > self.min_exclusive
    }

    fn name(&self) -> &'static str {
        "min-width"
    }
}

/// Kernel, order and filter of one segmentation stage.
pub struct StagePlan {
    pub label: &'static str,
    pub kernel: Kernel,
    pub sort: Box<dyn SortKey>,
    pub filter: Box<dyn RegionFilter>,
}

impl StagePlan {
    /// Page → full-width text bands, top to bottom.
    pub fn sections(params: &StageParams) -> Self {
        Self {
            label: "sections",
            kernel: params.section_kernel,
            sort: Box::new(TopToBottom),
            filter: Box::new(WidthNearPage {
                tolerance: params.section_width_tolerance,
            }),
        }
    }

    /// Section → text lines, in vertical-script reading order.
    pub fn lines(params: &StageParams) -> Self {
        Self {
            label: "lines",
            kernel: params.line_kernel,
            sort: Box::new(RightToLeftBottomToTop),
            filter: Box::new(MinWidth {
                min_exclusive: params.line_min_width,
            }),
        }
    }

    /// Split sorted candidates into (kept, discarded), preserving order.
    pub fn partition(&self, regions: Vec<Region>, frame: Frame) -> (Vec<Region>, Vec<Region>) {
        regions
            .into_iter()
            .partition(|r| self.filter.keep(&r.bbox, frame))
    }
}

impl std::fmt::Debug for StagePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePlan")
            .field("label", &self.label)
            .field("kernel", &self.kernel)
            .field("sort", &self.sort.name())
            .field("filter", &self.filter.name())
            .finish()
    }
}

// ── Region finder ────────────────────────────────────────────────────────

/// Find the regions of `img` merged by `kernel`, ordered by `sort`.
///
/// When `debug_dir` is set the dilated mask is written there as
/// `<label>_dilated.png`; failure to write it is logged and ignored.
/// An image with no ink yields an empty vector.
pub fn find_regions(
    img: &DynamicImage,
    threshold: u8,
    kernel: Kernel,
    sort: &dyn SortKey,
    debug_dir: Option<(&Path, &str)>,
) -> Vec<Region> {
    let mask = binarize(img, threshold);
    let dilated = dilate(&mask, kernel);

    if let Some((dir, label)) = debug_dir {
        let path = dir.join(format!("{label}_dilated.png"));
        if let Err(e) = dilated.save(&path) {
            warn!("Could not write debug mask {}: {}", path.display(), e);
        }
    }

    let mut regions: Vec<Region> = outer_contours(&dilated)
        .into_iter()
        .filter_map(|points| {
            let bbox = BoundingBox::enclosing(&points)?;
            Some(Region {
                contour: points,
                bbox,
            })
        })
        .collect();

    regions.sort_by(|a, b| sort.compare(&a.bbox, &b.bbox));
    debug!(
        "{} regions with kernel {} sorted {}",
        regions.len(),
        kernel,
        sort.name()
    );
    regions
}

/// Outer borders without a parent, in `mask` coordinates.
///
/// The border follower misses blobs that touch opposite image edges, so the
/// mask is traced inside a one pixel background frame and shifted back.
fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<u32>>> {
    let (w, h) = mask.dimensions();
    let mut framed = GrayImage::from_pixel(w + 2, h + 2, Luma([BACKGROUND]));
    imageops::replace(&mut framed, mask, 1, 1);

    find_contours::<u32>(&framed)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(p.x.saturating_sub(1), p.y.saturating_sub(1)))
                .collect()
        })
        .collect()
}

/// Binary dilation of `mask` with a `kernel.height × kernel.width` rectangle
/// anchored at its centre.
///
/// The rectangle is applied as a row mask followed by a column mask, which
/// gives the same result as the full rectangle in `width + height` lookups
/// per pixel instead of `width * height`.
pub fn dilate(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return mask.clone();
    }
    let rows = grayscale_dilate(mask, &rect_mask(kernel.width, 1));
    grayscale_dilate(&rows, &rect_mask(1, kernel.height))
}

/// Solid `width × height` structuring element centred on `(width / 2, height / 2)`.
///
/// Edges are clamped to [`MAX_KERNEL_EDGE`], so the centre fits in a `u8`.
fn rect_mask(width: u32, height: u32) -> Mask {
    let width = width.clamp(1, MAX_KERNEL_EDGE);
    let height = height.clamp(1, MAX_KERNEL_EDGE);
    let shape = GrayImage::from_pixel(width, height, Luma([FOREGROUND]));
    Mask::from_image(&shape, (width / 2) as u8, (height / 2) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::distance_transform::Norm;

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn ink(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
        for yy in y..y + h {
            for xx in x..x + w {
                img.put_pixel(xx, yy, Rgb([0, 0, 0]));
            }
        }
    }

    #[test]
    fn enclosing_box_is_inclusive() {
        let pts = [Point::new(3, 4), Point::new(7, 4), Point::new(7, 9), Point::new(3, 9)];
        assert_eq!(BoundingBox::enclosing(&pts), Some(BoundingBox::new(3, 4, 5, 6)));
        assert_eq!(BoundingBox::enclosing(&[]), None);
    }

    #[test]
    fn dilate_matches_square_morphology() {
        let mut mask = GrayImage::new(40, 30);
        mask.put_pixel(5, 5, Luma([255]));
        mask.put_pixel(20, 12, Luma([255]));
        mask.put_pixel(39, 29, Luma([255]));
        let ours = dilate(&mask, Kernel::new(5, 5));
        let reference = imageproc::morphology::dilate(&mask, Norm::LInf, 2);
        assert_eq!(ours, reference);
    }

    #[test]
    fn dilate_rectangle_extent() {
        let mut mask = GrayImage::new(50, 50);
        mask.put_pixel(25, 25, Luma([255]));
        let out = dilate(&mask, Kernel::new(3, 11));
        let ink: Vec<(u32, u32)> = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == FOREGROUND)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(ink.len(), 33);
        assert!(ink.iter().all(|&(x, y)| (20..=30).contains(&x) && (24..=26).contains(&y)));
    }

    #[test]
    fn row_then_column_equals_full_rectangle() {
        let mut mask = GrayImage::new(300, 120);
        for (x, y) in [(0, 0), (150, 60), (299, 119), (40, 100), (260, 5)] {
            mask.put_pixel(x, y, Luma([255]));
        }
        for kernel in [Kernel::new(10, 100), Kernel::new(17, 10), Kernel::new(4, 6)] {
            let full = grayscale_dilate(&mask, &rect_mask(kernel.width, kernel.height));
            assert_eq!(dilate(&mask, kernel), full, "kernel {kernel}");
        }
    }

    #[test]
    fn band_touching_both_edges_is_found() {
        let mut img = white(1000, 500);
        ink(&mut img, 0, 60, 1000, 40);
        ink(&mut img, 30, 300, 940, 40);
        let img = DynamicImage::ImageRgb8(img);

        let regions = find_regions(&img, 127, Kernel::new(10, 100), &TopToBottom, None);
        let boxes: Vec<BoundingBox> = regions.iter().map(|r| r.bbox).collect();
        assert_eq!(
            boxes,
            vec![
                BoundingBox::new(0, 56, 1000, 49),
                BoundingBox::new(0, 296, 1000, 49),
            ]
        );
    }

    #[test]
    fn region_filling_the_image_is_found() {
        let mut img = white(20, 10);
        ink(&mut img, 0, 0, 20, 10);
        let img = DynamicImage::ImageRgb8(img);
        let regions = find_regions(&img, 127, Kernel::new(1, 1), &TopToBottom, None);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(0, 0, 20, 10));
    }

    #[test]
    fn blank_image_has_no_regions() {
        let img = DynamicImage::ImageRgb8(white(64, 64));
        let regions = find_regions(&img, 127, Kernel::new(5, 5), &TopToBottom, None);
        assert!(regions.is_empty());
    }

    #[test]
    fn wide_kernel_merges_neighbouring_glyphs() {
        let mut img = white(120, 40);
        ink(&mut img, 10, 10, 10, 10);
        ink(&mut img, 30, 10, 10, 10);
        let img = DynamicImage::ImageRgb8(img);

        let narrow = find_regions(&img, 127, Kernel::new(1, 1), &TopToBottom, None);
        assert_eq!(narrow.len(), 2);

        let wide = find_regions(&img, 127, Kernel::new(3, 15), &TopToBottom, None);
        assert_eq!(wide.len(), 1);
        assert!(wide[0].bbox.width >= 30);
    }

    #[test]
    fn hole_does_not_become_a_region() {
        let mut img = white(60, 60);
        ink(&mut img, 10, 10, 40, 40);
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let img = DynamicImage::ImageRgb8(img);
        let regions = find_regions(&img, 127, Kernel::new(1, 1), &TopToBottom, None);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(10, 10, 40, 40));
    }

    #[test]
    fn regions_follow_sort_key() {
        let mut img = white(100, 100);
        ink(&mut img, 5, 70, 10, 10);
        ink(&mut img, 40, 10, 10, 10);
        ink(&mut img, 80, 40, 10, 10);
        let img = DynamicImage::ImageRgb8(img);

        let top = find_regions(&img, 127, Kernel::new(1, 1), &TopToBottom, None);
        let ys: Vec<u32> = top.iter().map(|r| r.bbox.y).collect();
        assert_eq!(ys, vec![10, 40, 70]);

        let rtl = find_regions(&img, 127, Kernel::new(1, 1), &RightToLeftBottomToTop, None);
        let xs: Vec<u32> = rtl.iter().map(|r| r.bbox.x).collect();
        assert_eq!(xs, vec![80, 40, 5]);
    }

    #[test]
    fn right_to_left_ties_break_bottom_first() {
        let upper = BoundingBox::new(10, 0, 20, 10);
        let lower = BoundingBox::new(0, 50, 30, 10);
        let left = BoundingBox::new(0, 0, 5, 5);
        let mut boxes = vec![left, upper, lower];
        boxes.sort_by(|a, b| RightToLeftBottomToTop.compare(a, b));
        assert_eq!(boxes, vec![lower, upper, left]);
    }

    #[test]
    fn top_to_bottom_is_stable_on_ties() {
        let a = BoundingBox::new(50, 10, 5, 5);
        let b = BoundingBox::new(0, 10, 5, 5);
        let mut boxes = vec![a, b];
        boxes.sort_by(|x, y| TopToBottom.compare(x, y));
        assert_eq!(boxes, vec![a, b]);
    }

    #[test]
    fn width_near_page_filter() {
        let f = WidthNearPage { tolerance: 600 };
        let frame = Frame {
            width: 2000,
            height: 3000,
        };
        assert!(f.keep(&BoundingBox::new(0, 0, 1900, 40), frame));
        assert!(f.keep(&BoundingBox::new(0, 0, 1401, 40), frame));
        assert!(!f.keep(&BoundingBox::new(0, 0, 1400, 40), frame));
        assert!(!f.keep(&BoundingBox::new(0, 0, 80, 40), frame));
    }

    #[test]
    fn min_width_filter_is_exclusive() {
        let f = MinWidth { min_exclusive: 30 };
        let frame = Frame {
            width: 500,
            height: 500,
        };
        assert!(!f.keep(&BoundingBox::new(0, 0, 25, 80), frame));
        assert!(!f.keep(&BoundingBox::new(0, 0, 30, 80), frame));
        assert!(f.keep(&BoundingBox::new(0, 0, 31, 80), frame));
    }

    #[test]
    fn filters_are_idempotent() {
        let plan = StagePlan::lines(&crate::SegmentationConfig::default().params_for(400));
        let frame = Frame {
            width: 400,
            height: 200,
        };
        let candidates: Vec<Region> = [10u32, 25, 31, 60, 30, 90]
            .iter()
            .enumerate()
            .map(|(i, &w)| Region {
                contour: Vec::new(),
                bbox: BoundingBox::new(i as u32 * 60, 0, w, 100),
            })
            .collect();
        let (kept, _) = plan.partition(candidates, frame);
        let once: Vec<BoundingBox> = kept.iter().map(|r| r.bbox).collect();
        let (again, dropped) = plan.partition(kept, frame);
        assert!(dropped.is_empty());
        assert_eq!(again.iter().map(|r| r.bbox).collect::<Vec<_>>(), once);
    }
}

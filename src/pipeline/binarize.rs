//! Fixed-threshold binarisation: colour page → ink mask.
//!
//! Ink is dark on a light background, so the threshold is inverted: a pixel
//! whose grayscale intensity is at or below `threshold` becomes foreground
//! (255) and everything brighter becomes background (0). Dilation and
//! contour extraction downstream treat non-zero as "ink".

use image::{DynamicImage, GrayImage, Luma};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Convert `img` to a single-channel ink mask.
///
/// Works for any channel layout (`to_luma8` handles RGB, RGBA, 16-bit and
/// already-gray inputs). The result is an independent copy.
pub fn binarize(img: &DynamicImage, threshold: u8) -> GrayImage {
    let mut gray = img.to_luma8();
    for Luma([v]) in gray.pixels_mut() {
        *v = if *v > threshold { BACKGROUND } else { FOREGROUND };
    }
    gray
}

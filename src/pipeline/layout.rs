//! On-disk layout of a results directory.
//!
//! ```text
//! results_<stem>/
//! ├── manifest.json
//! ├── section0.png            section crop
//! ├── section0_annotated.png  line boxes + indices (debug)
//! ├── section0/
//! │   ├── text0.png           line crops, reading order
//! │   └── text1.png
//! ├── section0.txt            transcript
//! └── debug/                  dilated masks (debug_masks only)
//! ```

use crate::error::TextbandError;
use image::{DynamicImage, ImageError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DEBUG_DIR: &str = "debug";

static RE_SECTION_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^section(\d+)$").unwrap());
static RE_LINE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^text(\d+)\.png$").unwrap());

pub fn section_name(index: usize) -> String {
    format!("section{index}")
}

/// Default results directory for an input image: `results_<file stem>`.
pub fn default_results_dir(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("results_{stem}"))
}

/// Paths of every artefact under one results directory.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn section_image(&self, section: usize) -> PathBuf {
        self.root.join(format!("{}.png", section_name(section)))
    }

    pub fn section_annotated(&self, section: usize) -> PathBuf {
        self.root
            .join(format!("{}_annotated.png", section_name(section)))
    }

    pub fn section_dir(&self, section: usize) -> PathBuf {
        self.root.join(section_name(section))
    }

    pub fn line_image(&self, section: usize, line: usize) -> PathBuf {
        self.section_dir(section).join(format!("text{line}.png"))
    }

    pub fn transcript(&self, section: usize) -> PathBuf {
        self.root.join(format!("{}.txt", section_name(section)))
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join(DEBUG_DIR)
    }
}

/// Parse `N` out of a `sectionN` directory name.
pub fn parse_section_dir(name: &str) -> Option<usize> {
    RE_SECTION_DIR
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}

/// Parse `M` out of a `textM.png` file name.
pub fn parse_line_file(name: &str) -> Option<usize> {
    RE_LINE_FILE.captures(name).and_then(|c| c[1].parse().ok())
}

/// Write `img` as PNG, mapping I/O failures and encoder failures apart.
pub fn write_png(img: &DynamicImage, path: &Path) -> Result<(), TextbandError> {
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| match e {
            ImageError::IoError(source) => TextbandError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            },
            other => TextbandError::ImageEncode {
                path: path.to_path_buf(),
                detail: other.to_string(),
            },
        })
}

/// `create_dir_all` with the error mapped to [`TextbandError::OutputWriteFailed`].
pub fn ensure_dir(dir: &Path) -> Result<(), TextbandError> {
    std::fs::create_dir_all(dir).map_err(|source| TextbandError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    })
}

//! Input loading: validate a user-supplied image path and decode it.
//!
//! Missing and unreadable files are distinguished before decoding so the
//! user gets "not found" or "permission denied" rather than an opaque
//! decoder message.

use crate::error::TextbandError;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Open and decode the page image at `path`.
pub fn load_image(path: &Path) -> Result<DynamicImage, TextbandError> {
    if !path.exists() {
        return Err(TextbandError::ImageNotFound {
            path: path.to_path_buf(),
        });
    }

    if let Err(e) = std::fs::File::open(path) {
        return Err(match e.kind() {
            std::io::ErrorKind::PermissionDenied => TextbandError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => TextbandError::ImageNotFound {
                path: path.to_path_buf(),
            },
        });
    }

    let img = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| TextbandError::ImageDecode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?
        .decode()
        .map_err(|e| TextbandError::ImageDecode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!(
        "Loaded {} → {}x{} px",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(img)
}

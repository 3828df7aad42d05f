//! Rebuild a [`Manifest`] from a results directory.
//!
//! When segmentation and OCR run in the same process the manifest is handed
//! over in memory and nothing here is used. When OCR runs later, as a
//! separate invocation, the structure comes from `manifest.json`, or failing
//! that from scanning for `sectionN/textM.png`.
//!
//! Paths inside `manifest.json` are stored relative to the results
//! directory so the directory can be moved or OCR'd from another cwd.

use crate::error::TextbandError;
use crate::output::{LineEntry, Manifest, SectionEntry};
use crate::pipeline::layout::{parse_line_file, parse_section_dir, ResultsLayout};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load `manifest.json` if present, otherwise scan the directory tree.
pub fn discover_manifest(results_dir: &Path) -> Result<Manifest, TextbandError> {
    if !results_dir.is_dir() {
        return Err(TextbandError::ResultsDirMissing {
            path: results_dir.to_path_buf(),
        });
    }

    let layout = ResultsLayout::new(results_dir);
    let manifest_path = layout.manifest();
    if manifest_path.is_file() {
        info!("Using {}", manifest_path.display());
        read_manifest(results_dir)
    } else {
        info!(
            "No manifest in {}, scanning for line images",
            results_dir.display()
        );
        scan_results_dir(results_dir)
    }
}

/// Persist `manifest` as `<results_dir>/manifest.json`.
pub fn write_manifest(manifest: &Manifest) -> Result<(), TextbandError> {
    let root = &manifest.results_dir;
    let path = ResultsLayout::new(root).manifest();
    let relative = Manifest {
        results_dir: PathBuf::from("."),
        sections: manifest
            .sections
            .iter()
            .map(|s| SectionEntry {
                index: s.index,
                image: s.image.as_deref().map(|p| relative_to(p, root)),
                bbox: s.bbox,
                lines: s
                    .lines
                    .iter()
                    .map(|l| LineEntry {
                        index: l.index,
                        path: relative_to(&l.path, root),
                        bbox: l.bbox,
                    })
                    .collect(),
            })
            .collect(),
    };

    let json = serde_json::to_vec_pretty(&relative)
        .map_err(|e| TextbandError::Internal(format!("manifest serialisation: {e}")))?;
    std::fs::write(&path, json).map_err(|source| TextbandError::OutputWriteFailed { path, source })
}

/// Read `<results_dir>/manifest.json`, resolving paths against `results_dir`.
pub fn read_manifest(results_dir: &Path) -> Result<Manifest, TextbandError> {
    let path = ResultsLayout::new(results_dir).manifest();
    let bytes = std::fs::read(&path).map_err(|e| TextbandError::ManifestInvalid {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    let mut manifest: Manifest =
        serde_json::from_slice(&bytes).map_err(|e| TextbandError::ManifestInvalid {
            path: path.clone(),
            detail: e.to_string(),
        })?;

    manifest.results_dir = results_dir.to_path_buf();
    for section in &mut manifest.sections {
        if let Some(image) = section.image.take() {
            section.image = Some(results_dir.join(image));
        }
        for line in &mut section.lines {
            line.path = results_dir.join(&line.path);
        }
        section.lines.sort_by_key(|l| l.index);
    }
    manifest.sections.sort_by_key(|s| s.index);
    Ok(manifest)
}

/// Build a manifest from `sectionN/textM.png` files alone.
///
/// Entries that do not follow the naming scheme are skipped with a warning.
/// Sections and lines are ordered by the numbers in their names, not by
/// directory listing order.
pub fn scan_results_dir(results_dir: &Path) -> Result<Manifest, TextbandError> {
    let layout = ResultsLayout::new(results_dir);
    let mut sections = Vec::new();

    for entry in read_dir(results_dir)? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(index) = parse_section_dir(&name) else {
            debug!("Skipping directory {}", path.display());
            continue;
        };

        let mut lines = Vec::new();
        for file in read_dir(&path)? {
            let file_name = file.file_name().to_string_lossy().into_owned();
            match parse_line_file(&file_name) {
                Some(line) => lines.push(LineEntry {
                    index: line,
                    path: file.path(),
                    bbox: None,
                }),
                None => warn!("Skipping unrecognised file {}", file.path().display()),
            }
        }
        lines.sort_by_key(|l| l.index);

        let image = layout.section_image(index);
        sections.push(SectionEntry {
            index,
            image: image.is_file().then_some(image),
            bbox: None,
            lines,
        });
    }
    sections.sort_by_key(|s| s.index);

    debug!(
        "Scanned {}: {} sections",
        results_dir.display(),
        sections.len()
    );
    Ok(Manifest {
        results_dir: results_dir.to_path_buf(),
        sections,
    })
}

fn read_dir(dir: &Path) -> Result<Vec<std::fs::DirEntry>, TextbandError> {
    std::fs::read_dir(dir)
        .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
        .map_err(|e| TextbandError::ManifestInvalid {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

//! Command-line tests for the `textband` binary.
//!
//! Only segmentation paths are exercised here; OCR needs a tesseract
//! install and is covered in-process by `tests/pipeline.rs`.
//!
//! Run with:
//!   cargo test --test cli -- --nocapture

#![cfg(feature = "cli")]

use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn textband(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_textband"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch textband")
}

/// Results directory left behind by an earlier run.
fn previous_run(root: &Path) -> PathBuf {
    let results = root.join("results_page");
    std::fs::create_dir_all(results.join("section0")).unwrap();
    std::fs::write(results.join("section0").join("text0.png"), b"png").unwrap();
    std::fs::write(results.join("section0.txt"), "line0: earlier\n").unwrap();
    results
}

/// Two bands of twelve 40 px columns on a 1000×500 page.
fn write_page(path: &Path) {
    let mut img = RgbImage::from_pixel(1000, 500, Rgb([255, 255, 255]));
    for y0 in [60u32, 300] {
        for k in 0..12u32 {
            let x0 = 20 + 80 * k;
            for y in y0..y0 + 100 {
                for x in x0..x0 + 40 {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
    }
    img.save(path).unwrap();
}

// ── Input validation ─────────────────────────────────────────────────────────

#[test]
fn test_missing_image_keeps_previous_results() {
    let dir = tempfile::tempdir().unwrap();
    let results = previous_run(dir.path());
    let missing = dir.path().join("page.png");

    let out = textband(&[
        missing.to_str().unwrap(),
        "--results-dir",
        results.to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Image file not found"), "stderr: {stderr}");
    assert_eq!(
        std::fs::read_to_string(results.join("section0.txt")).unwrap(),
        "line0: earlier\n"
    );
    assert!(results.join("section0").join("text0.png").exists());
}

#[test]
fn test_missing_image_keeps_previous_results_in_all_mode() {
    let dir = tempfile::tempdir().unwrap();
    let results = previous_run(dir.path());
    let missing = dir.path().join("page.png");

    let out = textband(&[
        missing.to_str().unwrap(),
        "--all",
        "--workers",
        "1",
        "--no-progress",
        "--results-dir",
        results.to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    assert!(results.join("section0.txt").exists());
}

#[test]
fn test_undecodable_image_keeps_previous_results() {
    let dir = tempfile::tempdir().unwrap();
    let results = previous_run(dir.path());
    let bogus = dir.path().join("page.png");
    std::fs::write(&bogus, b"not an image").unwrap();

    let out = textband(&[
        bogus.to_str().unwrap(),
        "--results-dir",
        results.to_str().unwrap(),
    ]);

    assert!(!out.status.success());
    assert!(results.join("section0.txt").exists());
}

// ── Segmentation mode ────────────────────────────────────────────────────────

#[test]
fn test_segmentation_replaces_previous_results() {
    let dir = tempfile::tempdir().unwrap();
    let results = previous_run(dir.path());
    let page = dir.path().join("page.png");
    write_page(&page);

    let out = textband(&[
        page.to_str().unwrap(),
        "--json",
        "--results-dir",
        results.to_str().unwrap(),
    ]);

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["stats"]["sections"], 2);
    assert_eq!(json["stats"]["lines"], 24);
    assert!(!results.join("section0.txt").exists());
    assert!(results.join("manifest.json").exists());
    assert!(results.join("section1").join("text11.png").exists());
}

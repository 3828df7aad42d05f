//! Pipeline stages for page segmentation and line OCR.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the OCR engine can be swapped without touching segmentation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ binarize ──▶ regions ──▶ sections ──▶ lines ──▶ discover
//! (decode)  (threshold)  (dilate +   (bands,      (columns,  (manifest)
//!                         contours)   top→down)    right→left)
//!
//! manifest ──▶ engine ──▶ postprocess ──▶ transcript
//!              (tesseract) (cleanup)      (sectionN.txt)
//! ```
//!
//! 1. [`input`]    — validate and decode the page image
//! 2. [`binarize`] — grayscale + inverted fixed threshold, ink → 255
//! 3. [`regions`]  — dilate, find external contours, bound and sort them
//! 4. [`sections`] — full-width bands of the page, persisted as crops
//! 5. [`lines`]    — vertical lines of each band, persisted as crops
//! 6. [`discover`] — persist or rebuild the section → line manifest
//! 7. [`engine`]   — run the OCR engine per line with retry/backoff
//! 8. [`postprocess`] — deterministic cleanup of engine output
//! 9. [`transcript`]  — reorder by line index and write atomically
//!
//! [`annotate`] and [`layout`] are shared helpers: debug overlays and the
//! on-disk naming scheme.

pub mod annotate;
pub mod binarize;
pub mod discover;
pub mod engine;
pub mod input;
pub mod layout;
pub mod lines;
pub mod postprocess;
pub mod regions;
pub mod sections;
pub mod transcript;

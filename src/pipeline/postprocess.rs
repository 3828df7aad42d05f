//! Post-processing: deterministic cleanup of raw engine output.
//!
//! ## Why is post-processing necessary?
//!
//! Tesseract's `stdout` output is meant for whole pages, not single line
//! crops. For one vertical line it still appends a form feed (`\x0c`) as a
//! page terminator, pads with blank lines, and occasionally leaks a BOM or
//! zero-width joiner from the language model. None of that belongs in a
//! `lineM: text` transcript entry, where an embedded newline would break
//! the one-entry-per-line format.
//!
//! ## Rule Order
//!
//! Line endings are normalised before the form feed is dropped so a lone
//! `\r` never survives, and trimming runs last so whitespace exposed by the
//! earlier rules is removed too.

/// Apply all cleanup rules to the raw engine output for one line image.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Remove page-break form feeds
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Join the remaining non-empty rows with a single space
/// 5. Trim surrounding whitespace
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_form_feeds(&s);
    let s = remove_invisible_chars(&s);
    let s = join_rows(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove form feeds ────────────────────────────────────────────────

fn remove_form_feeds(input: &str) -> String {
    input.replace('\x0c', "")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: One transcript entry per line image ─────────────────────────────
//
// A line crop occasionally comes back as two rows (a ruby annotation read
// separately, a glyph split across a gap). Keep the text, drop the break.

fn join_rows(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|row| !row.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────────

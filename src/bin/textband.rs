//! CLI binary for textband-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SegmentationConfig` / `OcrConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use textband_ocr::{
    default_results_dir, default_workers, discover_manifest, load_page, prepare_results_dir,
    segment_page, AnalysisOutput, Dispatcher, OcrConfig, OcrOutput, OcrProgressCallback,
    ProgressCallback, SegmentationConfig, SegmentationOutput,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over all lines of the page plus a log
/// row per finished section. Line events arrive out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-line wall-clock start times, keyed by (section, line).
    start_times: Mutex<HashMap<(usize, usize), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading manifest…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} lines  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn elapsed_ms(&self, section: usize, line: usize) -> u128 {
        self.start_times
            .lock()
            .map(|mut m| m.remove(&(section, line)))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0)
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_sections: usize, total_lines: usize) {
        self.activate_bar(total_lines);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Recognising {total_lines} lines in {total_sections} sections…"
            ))
        ));
    }

    fn on_line_start(&self, section: usize, line: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((section, line), Instant::now());
        }
        self.bar.set_message(format!("section{section}/text{line}"));
    }

    fn on_line_complete(&self, section: usize, line: usize, _chars: usize) {
        self.elapsed_ms(section, line);
        self.bar.inc(1);
    }

    fn on_line_error(&self, section: usize, line: usize, error: &str) {
        let elapsed_ms = self.elapsed_ms(section, line);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} section{}/text{:<4}  {}  {}",
            red("✗"),
            section,
            line,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_section_complete(&self, section: usize, recognised: usize, failed: usize) {
        let mark = if failed == 0 { green("✓") } else { cyan("⚠") };
        self.bar.println(format!(
            "  {} section{:<3} {}",
            mark,
            section,
            dim(&format!("{recognised} ok, {failed} failed")),
        ));
    }

    fn on_run_complete(&self, total_lines: usize, recognised: usize) {
        let failed = total_lines.saturating_sub(recognised);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} lines recognised",
                green("✔"),
                bold(&recognised.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} lines recognised  ({} failed)",
                if failed == total_lines {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&recognised.to_string()),
                total_lines,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Segment a page into results_page/ (section and line crops)
  textband page.png

  # OCR a previously segmented page
  textband --ocr page.png

  # Both stages in one go, 4 tesseract workers
  textband --all --workers 4 page.png

  # Scale the pixel constants for a 1240 px wide scan tuned at 2480 px
  textband --reference-width 2480 small_page.png

  # Dump dilated masks for tuning, JSON summary on stdout
  textband --debug-masks --json page.png > segmentation.json

RESULTS DIRECTORY:
  results_<stem>/manifest.json            section → line image list
  results_<stem>/sectionN.png             band crop
  results_<stem>/sectionN_annotated.png   band with numbered line boxes
  results_<stem>/sectionN/textM.png       line crops, right to left
  results_<stem>/sectionN.txt             transcript: "lineM: text"

ENVIRONMENT VARIABLES:
  RUST_LOG                 Override log filter (e.g. textband_ocr=debug)
  TEXTBAND_*               Every flag has a TEXTBAND_<FLAG> fallback

SETUP:
  tesseract and the jpn_vert language data must be on PATH for --ocr/--all.
"#;

/// Segment vertical-script page scans into lines and OCR them in parallel.
#[derive(Parser, Debug)]
#[command(
    name = "textband",
    version,
    about = "Segment vertical-script page scans into lines and OCR them in parallel",
    long_about = "Split a scanned page of vertical text into full-width sections and then into \
individual lines (right to left), persist the crops, and run tesseract on every line with a \
bounded worker pool, writing one ordered transcript per section.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Page image (PNG or JPEG).
    image: PathBuf,

    /// OCR an existing results directory instead of segmenting.
    #[arg(long, env = "TEXTBAND_OCR", conflicts_with = "all")]
    ocr: bool,

    /// Segment and OCR in one process.
    #[arg(long, env = "TEXTBAND_ALL")]
    all: bool,

    /// Results directory. Default: results_<image stem>.
    #[arg(long, env = "TEXTBAND_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    /// Concurrent OCR subprocesses; must be below the host core count.
    #[arg(short, long, env = "TEXTBAND_WORKERS", default_value_t = default_workers())]
    workers: usize,

    /// Tesseract language pack.
    #[arg(long, env = "TEXTBAND_LANG", default_value = "jpn_vert")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, env = "TEXTBAND_PSM", default_value_t = 5,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// Tesseract executable.
    #[arg(long, env = "TEXTBAND_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Retries per line on engine failure.
    #[arg(long, env = "TEXTBAND_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-line engine timeout in seconds. Default: none.
    #[arg(long, env = "TEXTBAND_TIMEOUT")]
    timeout: Option<u64>,

    /// Page width the pixel constants were tuned for; rescales them.
    #[arg(long, env = "TEXTBAND_REFERENCE_WIDTH")]
    reference_width: Option<u32>,

    /// Do not write sectionN_annotated.png.
    #[arg(long, env = "TEXTBAND_NO_ANNOTATE")]
    no_annotate: bool,

    /// Write dilated masks and a page overlay to <results>/debug/.
    #[arg(long, env = "TEXTBAND_DEBUG_MASKS")]
    debug_masks: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "TEXTBAND_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TEXTBAND_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TEXTBAND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TEXTBAND_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar only exists while OCR runs; pure segmentation keeps
    // INFO logs as its feedback.
    let runs_ocr = cli.ocr || cli.all;
    let show_progress = runs_ocr && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let results_dir = cli
        .results_dir
        .clone()
        .unwrap_or_else(|| default_results_dir(&cli.image));

    // ── OCR-only mode ────────────────────────────────────────────────────
    if cli.ocr {
        let dispatcher = build_dispatcher(&cli, show_progress)?;
        let manifest = discover_manifest(&results_dir)
            .with_context(|| format!("Failed to read {}", results_dir.display()))?;
        let output = dispatcher
            .recognise(&manifest)
            .await
            .context("OCR failed")?;
        return report_ocr(&cli, &output, show_progress);
    }

    let seg_config = build_segmentation_config(&cli)?;

    // ── Both stages ──────────────────────────────────────────────────────
    // Pool and input are both validated before the previous results are
    // thrown away.
    if cli.all {
        let dispatcher = build_dispatcher(&cli, show_progress)?;
        let page = load_page(&cli.image).await.context("Cannot read input image")?;
        prepare_results_dir(&results_dir).await?;
        let segmentation = segment_page(page, &results_dir, &seg_config)
            .await
            .context("Segmentation failed")?;
        let ocr = dispatcher
            .recognise(&segmentation.manifest)
            .await
            .context("OCR failed")?;
        let output = AnalysisOutput { segmentation, ocr };
        if cli.json {
            print_json(&output)?;
            return Ok(());
        }
        report_segmentation(&cli, &output.segmentation, &results_dir);
        return report_ocr(&cli, &output.ocr, show_progress);
    }

    // ── Segmentation mode ────────────────────────────────────────────────
    let page = load_page(&cli.image).await.context("Cannot read input image")?;
    prepare_results_dir(&results_dir).await?;
    let output = segment_page(page, &results_dir, &seg_config)
        .await
        .context("Segmentation failed")?;
    if cli.json {
        print_json(&output)?;
    } else {
        report_segmentation(&cli, &output, &results_dir);
    }
    Ok(())
}

/// Map CLI args to `SegmentationConfig`.
fn build_segmentation_config(cli: &Cli) -> Result<SegmentationConfig> {
    let mut builder = SegmentationConfig::builder()
        .annotate(!cli.no_annotate)
        .debug_masks(cli.debug_masks);
    if let Some(px) = cli.reference_width {
        builder = builder.reference_width(px);
    }
    builder.build().context("Invalid segmentation configuration")
}

/// Map CLI args to `OcrConfig` and validate the pool against this host.
fn build_dispatcher(cli: &Cli, show_progress: bool) -> Result<Dispatcher> {
    let mut builder = OcrConfig::builder()
        .workers(cli.workers)
        .language(cli.lang.clone())
        .page_seg_mode(cli.psm)
        .tesseract_program(cli.tesseract.clone())
        .max_retries(cli.max_retries);

    if let Some(secs) = cli.timeout {
        builder = builder.task_timeout_secs(secs);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid OCR configuration")?;
    Ok(Dispatcher::new(config)?)
}

fn report_segmentation(cli: &Cli, output: &SegmentationOutput, results_dir: &Path) {
    if cli.quiet {
        return;
    }
    let s = &output.stats;
    eprintln!(
        "{}  {} sections  {} lines  {}ms  →  {}",
        if s.sections == 0 { cyan("⚠") } else { green("✔") },
        s.sections,
        s.lines,
        s.duration_ms,
        bold(&results_dir.display().to_string()),
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "{}x{} px, {} band / {} line candidates",
            s.page_width, s.page_height, s.section_candidates, s.line_candidates
        )),
    );
}

fn report_ocr(cli: &Cli, output: &OcrOutput, show_progress: bool) -> Result<()> {
    if cli.json {
        return print_json(output);
    }
    if cli.quiet {
        return Ok(());
    }
    // The progress callback already printed its own summary line.
    if !show_progress {
        eprintln!(
            "Recognised {}/{} lines in {}ms",
            output.stats.recognised, output.stats.lines, output.stats.duration_ms
        );
        if output.stats.failed > 0 {
            eprintln!("  {} lines failed", output.stats.failed);
        }
    }
    for t in &output.transcripts {
        eprintln!("   {}", dim(&t.path.display().to_string()));
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

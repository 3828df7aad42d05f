//! OCR engine boundary: one line image in, recognised text out.
//!
//! The dispatcher only ever sees [`OcrEngine`]. [`TesseractEngine`] is the
//! production implementation; tests plug in scripted engines.
//!
//! ## Retry Strategy
//!
//! A crashed or non-zero-exit subprocess is usually transient (memory
//! pressure with many workers, a killed child). [`recognise_line`] retries
//! those with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with
//! the defaults that is 250 ms → 500 ms. A missing image, a missing engine
//! binary or undecodable output fail immediately.

use crate::config::OcrConfig;
use crate::error::OcrFailure;
use crate::output::LineResult;
use crate::pipeline::postprocess::clean_text;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Anything that can turn a line image into text.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text in `image`. Returns the raw engine output.
    fn recognise<'a>(&'a self, image: &'a Path) -> BoxFuture<'a, Result<String, OcrFailure>>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

/// Runs `tesseract <image> stdout -l <lang> --psm <mode>` per line.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    program: String,
    language: String,
    page_seg_mode: u8,
}

impl TesseractEngine {
    pub fn new(program: impl Into<String>, language: impl Into<String>, page_seg_mode: u8) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
            page_seg_mode,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            config.tesseract_program.clone(),
            config.language.clone(),
            config.page_seg_mode,
        )
    }

    async fn run(&self, image: &Path) -> Result<String, OcrFailure> {
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_seg_mode.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    OcrFailure::EngineUnavailable {
                        program: self.program.clone(),
                        detail: e.to_string(),
                    }
                }
                _ => OcrFailure::EngineFailed {
                    exit_code: None,
                    stderr: e.to_string(),
                },
            })?;

        if !output.status.success() {
            return Err(OcrFailure::EngineFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("{}: {}", image.display(), stderr.trim());
        }

        String::from_utf8(output.stdout).map_err(|e| OcrFailure::InvalidOutput {
            detail: e.to_string(),
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognise<'a>(&'a self, image: &'a Path) -> BoxFuture<'a, Result<String, OcrFailure>> {
        Box::pin(self.run(image))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// The engine a config asks for: the injected one, or tesseract.
pub fn engine_for(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    match &config.engine {
        Some(engine) => Arc::clone(engine),
        None => Arc::new(TesseractEngine::from_config(config)),
    }
}

/// One unit of OCR work: a single line image of a single section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrTask {
    pub section: usize,
    pub index: usize,
    pub path: PathBuf,
}

/// Recognise one line, retrying transient failures.
///
/// Always returns a `LineResult`; a line that never succeeds carries its
/// last failure in `error` so the caller can write a sentinel for it.
pub async fn recognise_line(engine: &dyn OcrEngine, task: &OcrTask, config: &OcrConfig) -> LineResult {
    let start = Instant::now();
    let timeout = config.task_timeout_secs.map(Duration::from_secs);

    let finish = |text: String, retries: u32, error: Option<OcrFailure>| LineResult {
        section: task.section,
        index: task.index,
        path: task.path.clone(),
        text,
        retries,
        duration_ms: start.elapsed().as_millis() as u64,
        error,
    };

    if !task.path.is_file() {
        warn!(
            "Section {} line {}: image missing at {}",
            task.section,
            task.index,
            task.path.display()
        );
        let failure = OcrFailure::MissingImage {
            path: task.path.clone(),
        };
        return finish(String::new(), 0, Some(failure));
    }

    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Section {} line {}: retry {}/{} after {}ms",
                task.section, task.index, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match attempt_once(engine, &task.path, timeout).await {
            Ok(raw) => {
                let text = clean_text(&raw);
                debug!(
                    "Section {} line {}: {} chars via {}",
                    task.section,
                    task.index,
                    text.chars().count(),
                    engine.name()
                );
                return finish(text, attempt, None);
            }
            Err(failure) => {
                warn!(
                    "Section {} line {}: attempt {} failed: {}",
                    task.section,
                    task.index,
                    attempt + 1,
                    failure
                );
                if !failure.is_retryable() || attempt >= config.max_retries {
                    return finish(String::new(), attempt, Some(failure));
                }
            }
        }
        attempt += 1;
    }
}

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

async fn attempt_once(
    engine: &dyn OcrEngine,
    image: &Path,
    timeout: Option<Duration>,
) -> Result<String, OcrFailure> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, engine.recognise(image))
            .await
            .map_err(|_| OcrFailure::Timeout {
                secs: limit.as_secs(),
            })?,
        None => engine.recognise(image).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given failure `fail_times` times, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
        failure: OcrFailure,
    }

    impl OcrEngine for Flaky {
        fn recognise<'a>(&'a self, _image: &'a Path) -> BoxFuture<'a, Result<String, OcrFailure>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.fail_times {
                    Err(self.failure.clone())
                } else {
                    Ok("\u{FEFF}縦書き\n\x0c".to_string())
                }
            })
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct Slow;

    impl OcrEngine for Slow {
        fn recognise<'a>(&'a self, _image: &'a Path) -> BoxFuture<'a, Result<String, OcrFailure>> {
            Box::pin(async {
                sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            })
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn crashed() -> OcrFailure {
        OcrFailure::EngineFailed {
            exit_code: Some(1),
            stderr: "boom".into(),
        }
    }

    fn task_in(dir: &Path) -> OcrTask {
        let path = dir.join("text0.png");
        std::fs::write(&path, b"png").unwrap();
        OcrTask {
            section: 2,
            index: 0,
            path,
        }
    }

    fn fast_config(max_retries: u32) -> OcrConfig {
        OcrConfig::builder()
            .workers(1)
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn success_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: 0,
            failure: crashed(),
        };
        let r = recognise_line(&engine, &task_in(dir.path()), &fast_config(0)).await;
        assert!(r.is_ok());
        assert_eq!(r.text, "縦書き");
        assert_eq!(r.section, 2);
        assert_eq!(r.retries, 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: 2,
            failure: crashed(),
        };
        let r = recognise_line(&engine, &task_in(dir.path()), &fast_config(2)).await;
        assert!(r.is_ok(), "{:?}", r.error);
        assert_eq!(r.retries, 2);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            failure: crashed(),
        };
        let r = recognise_line(&engine, &task_in(dir.path()), &fast_config(1)).await;
        assert_eq!(r.error, Some(crashed()));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert!(r.text.is_empty());
    }

    #[tokio::test]
    async fn unavailable_engine_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: u32::MAX,
            failure: OcrFailure::EngineUnavailable {
                program: "tesseract".into(),
                detail: "not found".into(),
            },
        };
        let r = recognise_line(&engine, &task_in(dir.path()), &fast_config(3)).await;
        assert!(!r.is_ok());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_image_skips_engine() {
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: 0,
            failure: crashed(),
        };
        let task = OcrTask {
            section: 0,
            index: 4,
            path: PathBuf::from("/no/such/text4.png"),
        };
        let r = recognise_line(&engine, &task, &fast_config(2)).await;
        assert!(matches!(r.error, Some(OcrFailure::MissingImage { .. })));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(dir.path());
        let err = attempt_once(&Slow, &task.path, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrFailure::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(dir.path());
        let engine = TesseractEngine::new("textband-no-such-ocr-binary", "jpn_vert", 5);
        let err = engine.recognise(&task.path).await.unwrap_err();
        assert!(matches!(err, OcrFailure::EngineUnavailable { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_in(dir.path());
        let engine = TesseractEngine::new("false", "jpn_vert", 5);
        let err = engine.recognise(&task.path).await.unwrap_err();
        assert!(
            matches!(err, OcrFailure::EngineFailed { exit_code: Some(1), .. }),
            "{err:?}"
        );
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(250, 1), 250);
        assert_eq!(backoff_ms(250, 3), 1000);
        assert_eq!(backoff_ms(250, 40), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(0, 100), 0);
        assert_eq!(backoff_ms(1, 65), MAX_BACKOFF_MS);
    }

    #[tokio::test]
    async fn many_retries_without_backoff_do_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Flaky {
            calls: AtomicU32::new(0),
            fail_times: 80,
            failure: crashed(),
        };
        let config = OcrConfig::builder()
            .workers(1)
            .max_retries(100)
            .retry_backoff_ms(0)
            .build()
            .unwrap();
        let result = recognise_line(&engine, &task_in(dir.path()), &config).await;
        assert!(result.is_ok());
        assert_eq!(result.retries, 80);
    }

    #[test]
    fn injected_engine_wins() {
        let engine: Arc<dyn OcrEngine> = Arc::new(Slow);
        let config = OcrConfig::builder().workers(1).engine(engine).build().unwrap();
        assert_eq!(engine_for(&config).name(), "slow");
        assert_eq!(engine_for(&OcrConfig::default()).name(), "tesseract");
    }
}

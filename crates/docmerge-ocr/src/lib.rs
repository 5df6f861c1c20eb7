//! OCR fallback adapter
//!
//! Runs an external OCR executable (Tesseract by default) on a rendered image
//! and returns the recognized text. The executable is treated as an untrusted
//! collaborator:
//! - the run is bounded by a timeout, and the child is killed when the timeout
//!   expires or the calling future is dropped (`kill_on_drop`)
//! - a non-zero exit status *or* any output on stderr is a typed
//!   [`OcrError::SubprocessFailure`], never an empty-string success
//!
//! # Example
//!
//! ```no_run
//! use docmerge_core::OcrConfig;
//! use docmerge_ocr::{OcrEngine, TesseractCli};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), docmerge_ocr::OcrError> {
//! let ocr = TesseractCli::new(&OcrConfig::default());
//! let text = ocr.recognize(Path::new("scan.png")).await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

use docmerge_core::{DocmergeError, OcrConfig};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// OCR-specific errors
#[derive(Error, Debug)]
pub enum OcrError {
    /// The OCR executable is not installed or not on `PATH`
    #[error("OCR executable not found: {0}")]
    NotFound(String),

    /// The executable exited non-zero or wrote to stderr
    #[error("OCR process failed (exit code {code:?}): {stderr}")]
    SubprocessFailure {
        code: Option<i32>,
        stderr: String,
    },

    /// The run exceeded its time budget and was killed
    #[error("OCR process timed out after {0:?}")]
    Timeout(Duration),

    /// The image to recognize does not exist
    #[error("OCR input not found: {0}")]
    InputMissing(String),

    /// Spawning or waiting on the process failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<OcrError> for DocmergeError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::SubprocessFailure { code, stderr } => Self::SubprocessFailure { code, stderr },
            OcrError::Timeout(limit) => Self::SubprocessFailure {
                code: None,
                stderr: format!("killed after {limit:?}"),
            },
            OcrError::NotFound(cmd) => Self::SubprocessFailure {
                code: None,
                stderr: format!("executable not found: {cmd}"),
            },
            other => Self::ExtractionError(other.to_string()),
        }
    }
}

/// Text recognition on a rendered image.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text of the image at `image`.
    async fn recognize(&self, image: &Path) -> Result<String, OcrError>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

/// OCR through a command-line executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractCli {
    command: String,
    args: Vec<String>,
    language: String,
    timeout: Duration,
}

impl TesseractCli {
    /// Build from configuration
    #[must_use = "OCR runner is created but not used"]
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            language: config.language.clone(),
            timeout: config.timeout(),
        }
    }

    /// Override the time budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments with `{input}` and `{lang}` substituted.
    #[must_use]
    pub fn build_args(&self, input: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                "{input}" => input.as_os_str().to_os_string(),
                other => OsString::from(other.replace("{lang}", &self.language)),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        if !image.exists() {
            return Err(OcrError::InputMissing(image.display().to_string()));
        }

        let args = self.build_args(image);
        debug!("Running OCR: {} {:?}", self.command, args);

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    OcrError::NotFound(self.command.clone())
                } else {
                    OcrError::Io(e)
                }
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "OCR process {} exceeded {:?}, killed",
                    self.command, self.timeout
                );
                return Err(OcrError::Timeout(self.timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            return Err(OcrError::SubprocessFailure {
                code: output.status.code(),
                stderr,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("OCR recognized {} characters", text.chars().count());
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.command
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner(command: &str, args: &[&str]) -> TesseractCli {
        let config = OcrConfig {
            command: command.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            ..OcrConfig::default()
        };
        TesseractCli::new(&config)
    }

    fn image_file() -> tempfile::NamedTempFile {
        tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("temp image")
    }

    #[test]
    fn test_build_args_substitutes_placeholders() {
        let ocr = TesseractCli::new(&OcrConfig::default());
        let args: Vec<String> = ocr
            .build_args(Path::new("/tmp/page.png"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["/tmp/page.png", "stdout", "-l", "eng"]);
    }

    #[tokio::test]
    async fn test_stdout_is_returned_trimmed() {
        let image = image_file();
        let ocr = runner("sh", &["-c", "echo '  Hello {{name}}  '", "sh", "{input}"]);
        let text = ocr.recognize(image.path()).await.unwrap();
        assert_eq!(text, "Hello {{name}}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_typed_failure() {
        let image = image_file();
        let ocr = runner("sh", &["-c", "exit 3"]);
        match ocr.recognize(image.path()).await {
            Err(OcrError::SubprocessFailure { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("expected SubprocessFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_output_is_failure_even_on_success_exit() {
        let image = image_file();
        let ocr = runner("sh", &["-c", "echo 'Tesseract warning' >&2; echo text"]);
        match ocr.recognize(image.path()).await {
            Err(OcrError::SubprocessFailure { code, stderr }) => {
                assert_eq!(code, Some(0));
                assert_eq!(stderr, "Tesseract warning");
            }
            other => panic!("expected SubprocessFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let image = image_file();
        let ocr = runner("sleep", &["10"]).with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = ocr.recognize(image.path()).await.unwrap_err();
        assert!(matches!(err, OcrError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let image = image_file();
        let ocr = runner("docmerge-no-such-ocr-binary", &["{input}"]);
        let err = ocr.recognize(image.path()).await.unwrap_err();
        assert!(matches!(err, OcrError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let ocr = TesseractCli::new(&OcrConfig::default());
        let err = ocr
            .recognize(Path::new("/nonexistent/scan.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::InputMissing(_)));
    }

    #[test]
    fn test_conversion_to_engine_error() {
        let err: DocmergeError = OcrError::SubprocessFailure {
            code: Some(1),
            stderr: "boom".into(),
        }
        .into();
        assert!(matches!(err, DocmergeError::SubprocessFailure { code: Some(1), .. }));

        let err: DocmergeError = OcrError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_degradable());
    }
}

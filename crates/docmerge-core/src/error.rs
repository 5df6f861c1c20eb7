//! Error types for template import and merge operations.
//!
//! The variants mirror the failure taxonomy of the engine. Two of them are
//! fatal and surface to the caller immediately (`FormatError`,
//! `ValidationError`); the extraction and verification variants are normally
//! absorbed into a flagged, degraded result by the component that raised them.

use thiserror::Error;

/// Error types that can occur while importing or merging a template.
///
/// # Examples
///
/// ```rust
/// use docmerge_core::{DocmergeError, placeholder};
///
/// match placeholder::extract("Dear {{1st}}") {
///     Err(DocmergeError::ValidationError { tokens }) => assert_eq!(tokens, vec!["1st"]),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum DocmergeError {
    /// The bytes are not a ZIP-based document container.
    ///
    /// Fatal: a non-container file cannot be merged and there is no fallback.
    #[error("Format error: {0}")]
    FormatError(String),

    /// The text or OCR layer failed to produce text.
    ///
    /// Non-fatal on the upload path, where it degrades to the manual-entry
    /// fallback message.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// One or more placeholder tokens do not normalize to a valid name.
    ///
    /// Carries the offending raw tokens; the whole import is rejected.
    #[error("Invalid placeholder tokens: {}", tokens.join(", "))]
    ValidationError {
        /// Raw tokens as they appeared between the braces
        tokens: Vec<String>,
    },

    /// Post-substitution checks failed.
    ///
    /// The merge engine answers with the unmodified template instead of
    /// raising this; it is exposed for callers that want a hard failure.
    #[error("Merge verification failed ({reason}); unresolved: [{}]", unresolved.join(", "))]
    MergeVerificationFailure {
        /// Variables still present inside braces after substitution
        unresolved: Vec<String>,
        /// Which check failed
        reason: String,
    },

    /// The external OCR executable failed (non-zero exit, stderr output, timeout).
    ///
    /// Treated as an extraction failure by the upload pipeline.
    #[error("OCR subprocess failed (exit code {}): {stderr}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    SubprocessFailure {
        /// Exit code, `None` when killed or never started
        code: Option<i32>,
        /// Captured standard error or a description of the failure
        stderr: String,
    },

    /// A template, entry or stored file does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A configuration file could not be read or rendered.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The ZIP container could not be read or written.
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// A WordprocessingML part could not be parsed or serialized.
    #[error("XML error: {0}")]
    XmlError(String),

    /// File I/O error (working copies, temp files).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DocmergeError {
    /// True for the failures the pipeline absorbs into a degraded result.
    #[inline]
    #[must_use = "returns whether the error degrades instead of failing"]
    pub const fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::ExtractionError(_)
                | Self::SubprocessFailure { .. }
                | Self::MergeVerificationFailure { .. }
        )
    }
}

/// Type alias for [`Result<T, DocmergeError>`].
pub type Result<T> = std::result::Result<T, DocmergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_tokens() {
        let error = DocmergeError::ValidationError {
            tokens: vec!["1st".to_string(), "$$".to_string()],
        };
        assert_eq!(error.to_string(), "Invalid placeholder tokens: 1st, $$");
    }

    #[test]
    fn test_subprocess_failure_display() {
        let error = DocmergeError::SubprocessFailure {
            code: Some(1),
            stderr: "read_params_file: Can't open eng".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("exit code 1"));
        assert!(display.contains("Can't open eng"));

        let killed = DocmergeError::SubprocessFailure {
            code: None,
            stderr: "timed out".to_string(),
        };
        assert!(killed.to_string().contains("exit code none"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: DocmergeError = io_err.into();
        assert!(matches!(err, DocmergeError::IoError(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_degradable_classification() {
        assert!(DocmergeError::ExtractionError("empty".into()).is_degradable());
        assert!(DocmergeError::SubprocessFailure {
            code: Some(2),
            stderr: String::new()
        }
        .is_degradable());
        assert!(!DocmergeError::FormatError("not a zip".into()).is_degradable());
        assert!(!DocmergeError::ValidationError { tokens: vec![] }.is_degradable());
    }

    #[test]
    fn test_error_size() {
        let size = std::mem::size_of::<DocmergeError>();
        assert!(size < 128, "DocmergeError is {size} bytes");
    }
}

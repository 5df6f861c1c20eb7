//! Engine configuration.
//!
//! Configuration files can be placed in:
//! - Project directory: `./docmerge.toml`
//! - User home directory: `~/.docmerge.toml`
//!
//! The first file found wins; `DOCMERGE_*` environment variables are applied
//! on top. Every field has a built-in default, so an empty file is valid.

use crate::error::{DocmergeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Message stored as template text when no text could be extracted
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Text not extracted, add variables manually";

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocmergeConfig {
    pub merge: MergeConfig,
    pub ocr: OcrConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Merge engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Minimum output/input byte ratio accepted by verification
    pub min_size_ratio: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_size_ratio: 0.8,
        }
    }
}

/// OCR subprocess settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Executable name or path
    pub command: String,
    /// Arguments; `{input}` and `{lang}` are substituted
    pub args: Vec<String>,
    /// Recognition language passed as `{lang}`
    pub language: String,
    /// Hard limit for one OCR run
    pub timeout_secs: u64,
    /// Template text used when OCR yields nothing
    pub fallback_message: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: "tesseract".to_string(),
            args: vec![
                "{input}".to_string(),
                "stdout".to_string(),
                "-l".to_string(),
                "{lang}".to_string(),
            ],
            language: "eng".to_string(),
            timeout_secs: 30,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl OcrConfig {
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local file storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding uploaded templates and thumbnails
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/files"),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Upload size limit in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl DocmergeConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// I/O failure, or a TOML syntax/shape error (reported with its location).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            DocmergeError::ConfigError(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Locate the config file: `./docmerge.toml`, then `~/.docmerge.toml`.
    #[must_use]
    pub fn discover_path() -> Option<PathBuf> {
        let project = PathBuf::from("docmerge.toml");
        if project.exists() {
            return Some(project);
        }
        let user = dirs::home_dir()?.join(".docmerge.toml");
        user.exists().then_some(user)
    }

    /// Explicit path if given, else discovered file, else defaults; then env overrides.
    ///
    /// # Errors
    ///
    /// Fails only when a config file exists but cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit.map(Path::to_path_buf).or_else(Self::discover_path);
        let mut config = match path {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::load_from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `DOCMERGE_*` environment overrides.
    ///
    /// - `DOCMERGE_MIN_SIZE_RATIO`
    /// - `DOCMERGE_OCR_COMMAND`, `DOCMERGE_OCR_LANGUAGE`, `DOCMERGE_OCR_TIMEOUT_SECS`
    /// - `DOCMERGE_STORAGE_ROOT`
    /// - `DOCMERGE_ADDR`
    pub fn apply_env(&mut self) {
        if let Some(ratio) = env::var("DOCMERGE_MIN_SIZE_RATIO")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.merge.min_size_ratio = ratio;
        }
        if let Ok(command) = env::var("DOCMERGE_OCR_COMMAND") {
            self.ocr.command = command;
        }
        if let Ok(language) = env::var("DOCMERGE_OCR_LANGUAGE") {
            self.ocr.language = language;
        }
        if let Some(secs) = env::var("DOCMERGE_OCR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.ocr.timeout_secs = secs;
        }
        if let Ok(root) = env::var("DOCMERGE_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(addr) = env::var("DOCMERGE_ADDR") {
            self.server.addr = addr;
        }
    }

    /// Render as TOML (used by `docmerge config init`)
    ///
    /// # Errors
    ///
    /// Serialization failure.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DocmergeError::ConfigError(format!("Failed to render config: {e}")))
    }
}

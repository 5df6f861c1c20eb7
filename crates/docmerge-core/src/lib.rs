//! Core types for docmerge
//!
//! This crate holds everything the template merge engine shares across its
//! surfaces:
//! - [`error`]: the failure taxonomy ([`DocmergeError`])
//! - [`types`]: templates, variables, entries and merge requests/results
//! - [`placeholder`]: detection and canonical naming of `{{ … }}` tokens
//! - [`unify`]: priority-ordered deduplication of variable lists
//! - [`config`]: TOML/env configuration
//!
//! # Example
//!
//! ```rust
//! use docmerge_core::{placeholder, VariableSource};
//!
//! let vars = placeholder::detect_variables(
//!     "Hello {{first name}}, your code is {{code-1}}.",
//!     VariableSource::DetectedFromText,
//! )?;
//! assert_eq!(vars[0].name, "first_name");
//! assert_eq!(vars[1].label, "Code 1");
//! # Ok::<(), docmerge_core::DocmergeError>(())
//! ```

pub mod config;
pub mod error;
pub mod placeholder;
pub mod types;
pub mod unify;

pub use config::{DocmergeConfig, MergeConfig, OcrConfig, ServerConfig, StorageConfig};
pub use error::{DocmergeError, Result};
pub use types::{
    Entry, FileRef, FormatSpec, MergeOutput, MergeRequest, MergeResult, OutputMode, ScalarValue,
    Template, Variable, VariableSource, VariableType, DOCX_CONTENT_TYPE,
};
pub use unify::unify;

//! DOCX backend for docmerge
//!
//! Everything that touches the binary container lives here:
//! - [`text`]: plain-text extraction, the live-text view used by merge
//!   verification, and embedded image lookup for OCR
//! - [`html`]: HTML conversion used by previews
//! - [`merge`]: the merge engine (run collapse, substitution, verification)
//! - [`helpers`]: registered value helpers (`date`, `upper`, `bold`, ...)
//! - [`preview`]: styled HTML preview of a merged document
//!
//! # Example
//!
//! ```no_run
//! use docmerge_backend::{MergeEngine, PreviewRenderer};
//! use docmerge_core::{Entry, ScalarValue};
//! use std::collections::HashMap;
//!
//! # fn main() -> docmerge_core::Result<()> {
//! let template = std::fs::read("offer.docx")?;
//! let values = HashMap::from([("first_name".to_string(), ScalarValue::from("Ana"))]);
//! let entry = Entry::new("e1", "f1", values);
//!
//! let outcome = MergeEngine::default().merge(&template, "", &[], &entry)?;
//! if !outcome.degraded {
//!     println!("{}", PreviewRenderer::new().render(&outcome.bytes)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod helpers;
pub mod html;
pub mod merge;
pub mod preview;
mod runs;
pub mod text;
pub mod working_copy;
mod xml;

pub use helpers::{Fragment, HelperFn, HelperRegistry};
pub use html::HtmlConversion;
pub use merge::{MergeEngine, MergeOutcome, MergeState};
pub use preview::PreviewRenderer;
pub use text::{DocxTextExtractor, MediaImage, TextExtractor};
pub use working_copy::WorkingCopy;

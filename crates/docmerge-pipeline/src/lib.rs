//! Upload pipeline and merge service for docmerge
//!
//! - [`import`]: classify an upload, extract text (OCR when there is none),
//!   detect and unify variables, store the file and a thumbnail
//! - [`service`]: [`MergeService`], the request-scoped operations behind the
//!   HTTP API and the CLI
//!
//! Blocking work (ZIP/XML processing, image decoding) runs on tokio's
//! blocking pool so the async surfaces stay responsive.

pub mod import;
pub mod service;

pub use import::{thumbnail_png, ImportOutcome, TemplateImporter, Upload, THUMBNAIL_SIZE};
pub use service::{MergeService, VariableUpdate};

use docmerge_core::{DocmergeError, Result};

/// Run `f` on the blocking pool and flatten the join error into the result.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocmergeError::IoError(std::io::Error::other(e)))?
}

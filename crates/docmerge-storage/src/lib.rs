//! Storage collaborators for docmerge
//!
//! The merge engine never touches filesystem paths of stored templates. It
//! talks to two narrow interfaces:
//! - **File storage** ([`FileStorage`]): `save(bytes, name) -> FileRef`,
//!   `read(FileRef)`, `delete(FileRef)`
//! - **Record lookup** ([`TemplateStore`], [`EntryStore`]): fetch templates and
//!   entries by id
//!
//! Local-disk and in-memory implementations are provided; production
//! deployments plug their own persistence behind the same traits.

use docmerge_core::DocmergeError;
use thiserror::Error;

pub mod file_storage;
pub mod records;

pub use file_storage::{FileStorage, LocalFileStorage, MemoryFileStorage};
pub use records::{EntryStore, MemoryEntryStore, MemoryTemplateStore, TemplateStore};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid file reference: {0}")]
    InvalidKey(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for DocmergeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::StorageError(other.to_string()),
        }
    }
}

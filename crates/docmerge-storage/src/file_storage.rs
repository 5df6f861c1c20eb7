//! Raw file storage addressed by opaque references.

use crate::{StorageError, StorageResult};
use docmerge_core::FileRef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Save/read/delete by opaque reference.
#[async_trait::async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes`; `original_name` is kept only as a readable suffix.
    async fn save(&self, bytes: &[u8], original_name: &str) -> StorageResult<FileRef>;

    /// Fetch the bytes behind `file_ref`
    async fn read(&self, file_ref: &FileRef) -> StorageResult<Vec<u8>>;

    /// Remove the file behind `file_ref`
    async fn delete(&self, file_ref: &FileRef) -> StorageResult<()>;
}

/// Keep only characters safe in a file name
fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn new_key(original_name: &str) -> String {
    format!(
        "{}_{}",
        uuid::Uuid::new_v4().simple(),
        sanitize_name(original_name)
    )
}

/// Files in one flat directory; references are file names.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Create a storage rooted at `root` (created lazily on first save)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference, rejecting anything that could escape `root`.
    fn path_for(&self, file_ref: &FileRef) -> StorageResult<PathBuf> {
        let key = file_ref.as_str();
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.starts_with('.')
            || key.contains("..")
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait::async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, bytes: &[u8], original_name: &str) -> StorageResult<FileRef> {
        tokio::fs::create_dir_all(&self.root).await?;
        let file_ref = FileRef::new(new_key(original_name));
        let path = self.path_for(&file_ref)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(file_ref)
    }

    async fn read(&self, file_ref: &FileRef) -> StorageResult<Vec<u8>> {
        let path = self.path_for(file_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("file {file_ref}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, file_ref: &FileRef) -> StorageResult<()> {
        let path = self.path_for(file_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("file {file_ref}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage for tests and single-node demos
#[derive(Debug, Default)]
pub struct MemoryFileStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl FileStorage for MemoryFileStorage {
    async fn save(&self, bytes: &[u8], original_name: &str) -> StorageResult<FileRef> {
        let key = new_key(original_name);
        self.files.write().await.insert(key.clone(), bytes.to_vec());
        Ok(FileRef::new(key))
    }

    async fn read(&self, file_ref: &FileRef) -> StorageResult<Vec<u8>> {
        self.files
            .read()
            .await
            .get(file_ref.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("file {file_ref}")))
    }

    async fn delete(&self, file_ref: &FileRef) -> StorageResult<()> {
        self.files
            .write()
            .await
            .remove(file_ref.as_str())
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("file {file_ref}")))
    }
}

//! Per-merge scratch directory.
//!
//! Every merge writes the template into its own temporary directory and
//! reads it back from there; the stored template bytes are never touched.
//! The directory is removed when the guard drops, on every exit path.

use docmerge_core::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const TEMPLATE_FILE: &str = "template.docx";
const OUTPUT_FILE: &str = "merged.docx";

/// Guard over a temporary directory holding one merge's files
#[derive(Debug)]
pub struct WorkingCopy {
    dir: Option<TempDir>,
    template: PathBuf,
}

impl WorkingCopy {
    /// Create a scratch directory and write `template` into it.
    ///
    /// # Errors
    ///
    /// I/O errors creating the directory or writing the file.
    pub fn create(template: &[u8]) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("docmerge-").tempdir()?;
        let path = dir.path().join(TEMPLATE_FILE);
        fs::write(&path, template)?;
        debug!("Working copy at {}", path.display());
        Ok(Self {
            dir: Some(dir),
            template: path,
        })
    }

    /// Directory holding the working files
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Bytes of the working copy of the template
    ///
    /// # Errors
    ///
    /// I/O errors reading the file.
    pub fn template_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.template)?)
    }

    /// Write merged output next to the template and read it back.
    ///
    /// # Errors
    ///
    /// I/O errors.
    pub fn store_output(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let path = self.template.with_file_name(OUTPUT_FILE);
        fs::write(&path, bytes)?;
        Ok(fs::read(&path)?)
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove working copy {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_removed_on_drop() {
        let copy = WorkingCopy::create(b"PK\x03\x04body").unwrap();
        let dir = copy.dir().unwrap().to_path_buf();
        assert_eq!(copy.template_bytes().unwrap(), b"PK\x03\x04body");
        assert_eq!(copy.store_output(b"out").unwrap(), b"out");
        assert!(dir.join("merged.docx").exists());

        drop(copy);
        assert!(!dir.exists());
    }

    #[test]
    fn test_directory_removed_on_early_return() {
        fn failing(dir: &mut Option<PathBuf>) -> Result<()> {
            let copy = WorkingCopy::create(b"x")?;
            *dir = copy.dir().map(Path::to_path_buf);
            Err(docmerge_core::DocmergeError::FormatError("boom".into()))
        }

        let mut dir = None;
        assert!(failing(&mut dir).is_err());
        assert!(!dir.unwrap().exists());
    }
}

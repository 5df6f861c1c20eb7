//! ZIP container access for WordprocessingML packages.

use docmerge_core::{DocmergeError, Result};
use regex::Regex;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::LazyLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Local-file header signature every ZIP container starts with
pub const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Main document part
pub const DOCUMENT_PART: &str = "word/document.xml";

static RE_TEXT_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^word/(document|header\d*|footer\d*|footnotes|endnotes)\.xml$")
        .expect("valid text part regex")
});

/// True if `bytes` start with the ZIP local-file signature
#[inline]
#[must_use]
pub fn has_container_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_SIGNATURE)
}

/// Fail with [`DocmergeError::FormatError`] unless `bytes` look like a container.
///
/// # Errors
///
/// Returns `FormatError` when the leading bytes are not `50 4B 03 04`.
pub fn ensure_container(bytes: &[u8]) -> Result<()> {
    if has_container_signature(bytes) {
        Ok(())
    } else {
        let head: Vec<String> = bytes.iter().take(4).map(|b| format!("{b:02X}")).collect();
        Err(DocmergeError::FormatError(format!(
            "not a ZIP document container (leading bytes: [{}])",
            head.join(" ")
        )))
    }
}

/// True for parts that carry user-visible text: body, headers, footers,
/// footnotes and endnotes.
#[inline]
#[must_use]
pub fn is_text_part(name: &str) -> bool {
    RE_TEXT_PART.is_match(name)
}

pub(crate) fn archive_error(e: zip::result::ZipError) -> DocmergeError {
    DocmergeError::ArchiveError(e.to_string())
}

/// Open `bytes` as a ZIP archive
pub(crate) fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)
}

/// Read one part as UTF-8; `None` when the part does not exist.
pub(crate) fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(archive_error(e)),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// Text part names, main document first, the rest in archive order.
pub(crate) fn text_part_names<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| is_text_part(name))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| (name != DOCUMENT_PART, archive.index_for_name(name)));
    names
}

/// Rebuild a container, letting `rewrite` replace the XML of text parts.
///
/// `rewrite` returns `Ok(None)` to keep a part as is. Kept entries are
/// raw-copied (no recompression); rewritten parts keep their original
/// compression method.
///
/// # Errors
///
/// Archive errors and any error returned by `rewrite`.
pub fn rewrite_text_parts<F>(bytes: &[u8], mut rewrite: F) -> Result<Vec<u8>>
where
    F: FnMut(&str, &str) -> Result<Option<String>>,
{
    let mut archive = open_archive(bytes)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(bytes.len())));

    for index in 0..archive.len() {
        let (name, compression, replacement) = {
            let mut file = archive.by_index(index).map_err(archive_error)?;
            let name = file.name().to_string();
            let compression = file.compression();
            let replacement = if !file.is_dir() && is_text_part(&name) {
                let mut xml = String::new();
                file.read_to_string(&mut xml)?;
                rewrite(&name, &xml)?
            } else {
                None
            };
            (name, compression, replacement)
        };

        match replacement {
            Some(xml) => {
                let method = match compression {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let options = SimpleFileOptions::default().compression_method(method);
                writer
                    .start_file(name.as_str(), options)
                    .map_err(archive_error)?;
                writer.write_all(xml.as_bytes())?;
            }
            None => {
                let raw = archive.by_index_raw(index).map_err(archive_error)?;
                writer.raw_copy_file(raw).map_err(archive_error)?;
            }
        }
    }

    let cursor = writer.finish().map_err(archive_error)?;
    Ok(cursor.into_inner())
}

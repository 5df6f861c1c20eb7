//! Text extraction adapter.
//!
//! Best-effort plain text from a DOCX container. Bytes that are not a
//! container (a scanned image, for instance) have no text layer and yield an
//! empty string; the caller decides whether to fall back to OCR.

use crate::container::{self, DOCUMENT_PART};
use crate::html::{self, HtmlConversion};
use crate::xml::unescape_text;
use docmerge_core::{DocmergeError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use tracing::{debug, warn};

/// Raster formats accepted as OCR input
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif"];

/// An image embedded under `word/media/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaImage {
    /// Archive path, e.g. `word/media/image1.png`
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MediaImage {
    /// Lower-case file extension
    #[must_use]
    pub fn extension(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(_, ext)| ext)
    }
}

/// Plain-text and HTML views of a document container.
pub trait TextExtractor: Send + Sync {
    /// Body text, one line per paragraph; `""` without a text layer.
    ///
    /// # Errors
    ///
    /// `ExtractionError` when a container cannot be read.
    fn extract_text(&self, bytes: &[u8]) -> Result<String>;

    /// Text of every text part: body, headers, footers, footnotes, endnotes.
    ///
    /// # Errors
    ///
    /// `FormatError` for non-container bytes, archive/XML errors otherwise.
    fn extract_live_text(&self, bytes: &[u8]) -> Result<String>;

    /// HTML rendition used for previews.
    ///
    /// # Errors
    ///
    /// `FormatError` for non-container bytes.
    fn convert_to_html(&self, bytes: &[u8]) -> Result<HtmlConversion>;

    /// Largest raster image under `word/media/`, if any.
    ///
    /// # Errors
    ///
    /// `FormatError` for non-container bytes, archive errors otherwise.
    fn first_media_image(&self, bytes: &[u8]) -> Result<Option<MediaImage>>;
}

/// [`TextExtractor`] for WordprocessingML packages
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxTextExtractor;

impl DocxTextExtractor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TextExtractor for DocxTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        if !container::has_container_signature(bytes) {
            debug!("No container signature, no text layer");
            return Ok(String::new());
        }
        let to_extraction = |e: DocmergeError| DocmergeError::ExtractionError(e.to_string());

        let mut archive = container::open_archive(bytes).map_err(to_extraction)?;
        let Some(xml) = container::read_part(&mut archive, DOCUMENT_PART).map_err(to_extraction)?
        else {
            warn!("Container has no {DOCUMENT_PART}");
            return Ok(String::new());
        };
        part_text(&xml).map_err(to_extraction)
    }

    fn extract_live_text(&self, bytes: &[u8]) -> Result<String> {
        container::ensure_container(bytes)?;
        let mut archive = container::open_archive(bytes)?;
        let mut parts = Vec::new();
        for name in container::text_part_names(&archive) {
            if let Some(xml) = container::read_part(&mut archive, &name)? {
                parts.push(part_text(&xml)?);
            }
        }
        Ok(parts.join("\n"))
    }

    fn convert_to_html(&self, bytes: &[u8]) -> Result<HtmlConversion> {
        container::ensure_container(bytes)?;
        html::convert(bytes)
    }

    fn first_media_image(&self, bytes: &[u8]) -> Result<Option<MediaImage>> {
        container::ensure_container(bytes)?;
        let mut archive = container::open_archive(bytes)?;

        let mut best: Option<(usize, u64)> = None;
        for index in 0..archive.len() {
            let file = archive.by_index(index).map_err(container::archive_error)?;
            let name = file.name();
            let is_image = name.starts_with("word/media/")
                && name.rsplit_once('.').is_some_and(|(_, ext)| {
                    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                });
            if is_image && best.map_or(true, |(_, size)| file.size() > size) {
                best = Some((index, file.size()));
            }
        }

        let Some((index, _)) = best else {
            return Ok(None);
        };
        let mut file = archive.by_index(index).map_err(container::archive_error)?;
        let name = file.name().to_ascii_lowercase();
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        debug!("Selected embedded image {name} ({} bytes)", data.len());
        Ok(Some(MediaImage { name, bytes: data }))
    }
}

/// Character a run-level break element reads as: `w:tab` is a tab,
/// `w:br`/`w:cr` a line break.
pub(crate) fn break_char(name: &[u8]) -> Option<char> {
    match name {
        b"w:tab" => Some('\t'),
        b"w:br" | b"w:cr" => Some('\n'),
        _ => None,
    }
}

/// Plain text of one part: paragraphs end with a newline, break elements
/// directly inside a run read as [`break_char`]. Tab stops in paragraph
/// properties, deleted text and field codes are skipped.
pub(crate) fn part_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut text = String::new();
    let mut in_text = false;
    // per open element: is it a run
    let mut open_runs: Vec<bool> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if name.as_ref() == b"w:t" {
                    in_text = true;
                }
                open_runs.push(name.as_ref() == b"w:r");
            }
            Ok(Event::End(e)) => {
                open_runs.pop();
                match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" => text.push('\n'),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) if open_runs.last() == Some(&true) => {
                if let Some(ch) = break_char(e.name().as_ref()) {
                    text.push(ch);
                }
            }
            Ok(Event::Text(e)) if in_text => text.push_str(&unescape_text(&e)?),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocmergeError::XmlError(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(text.trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<w:document><w:body>
<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>{{first</w:t></w:r><w:r><w:t xml:space="preserve"> name}}</w:t></w:r></w:p>
<w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t><w:br/><w:t>C &amp; D</w:t></w:r></w:p>
<w:p><w:r><w:delText>gone</w:delText><w:instrText> PAGE </w:instrText></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn test_part_text_layout() {
        assert_eq!(
            part_text(BODY).unwrap(),
            "Hello {{first name}}\nA\tB\nC & D"
        );
    }

    #[test]
    fn test_tab_stops_are_not_text() {
        let xml = r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>x</w:t><w:tab/><w:t>y</w:t></w:r></w:p>"#;
        assert_eq!(part_text(xml).unwrap(), "x\ty");
    }

    #[test]
    fn test_part_text_rejects_broken_xml() {
        assert!(part_text("<w:p><w:t>x</w:p>").is_err());
    }

    #[test]
    fn test_non_container_has_no_text_layer() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(DocxTextExtractor::new().extract_text(&png).unwrap(), "");
    }

    #[test]
    fn test_corrupt_container_is_extraction_error() {
        let err = DocxTextExtractor::new()
            .extract_text(b"PK\x03\x04 truncated")
            .unwrap_err();
        assert!(err.is_degradable(), "{err:?}");
    }

    #[test]
    fn test_live_text_requires_container() {
        let err = DocxTextExtractor::new()
            .extract_live_text(b"plain text")
            .unwrap_err();
        assert!(matches!(err, DocmergeError::FormatError(_)));
    }

    #[test]
    fn test_media_extension() {
        let image = MediaImage {
            name: "word/media/image1.jpeg".into(),
            bytes: Vec::new(),
        };
        assert_eq!(image.extension(), "jpeg");
    }
}

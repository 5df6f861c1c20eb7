//! Template upload pipeline.
//!
//! bytes → text extraction → (empty?) OCR fallback → placeholder detection →
//! unification → storage. Invalid placeholders reject the whole upload
//! before anything is stored; OCR trouble never does.

use crate::run_blocking;
use docmerge_backend::container;
use docmerge_backend::{DocxTextExtractor, TextExtractor};
use docmerge_core::placeholder::detect_variables;
use docmerge_core::{unify, DocmergeError, FileRef, Result, Variable, VariableSource};
use docmerge_ocr::OcrEngine;
use docmerge_storage::FileStorage;
use image::ImageFormat;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Thumbnail edge length in pixels
pub const THUMBNAIL_SIZE: u32 = 256;

/// Raster formats accepted as image-only templates
const OCR_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

/// One uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// Media type declared by the client, if any
    pub media_type: Option<String>,
}

impl Upload {
    #[must_use]
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, media_type: Option<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            media_type,
        }
    }
}

/// What the pipeline produced for one upload
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    /// Extracted text, OCR text, or the fallback message
    pub template_text: String,
    pub detected_variables: Vec<Variable>,
    pub stored_file_ref: FileRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<FileRef>,
    /// True when neither the text layer nor OCR produced text
    pub extraction_degraded: bool,
}

/// Kind of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Container,
    Image(ImageFormat),
}

fn classify_upload(bytes: &[u8], media_type: Option<&str>) -> Result<UploadKind> {
    if container::has_container_signature(bytes) {
        return Ok(UploadKind::Container);
    }
    if let Ok(format) = image::guess_format(bytes) {
        if OCR_FORMATS.contains(&format) {
            return Ok(UploadKind::Image(format));
        }
    }
    if let Some(format) = media_type.and_then(ImageFormat::from_mime_type) {
        if OCR_FORMATS.contains(&format) {
            return Ok(UploadKind::Image(format));
        }
    }
    Err(DocmergeError::FormatError(format!(
        "unsupported upload (declared type: {})",
        media_type.unwrap_or("none")
    )))
}

/// Text of the upload plus the image OCR would read
struct TextLayer {
    text: String,
    image: Option<(Vec<u8>, String)>,
}

/// Imports uploaded templates
#[derive(Clone)]
pub struct TemplateImporter {
    extractor: DocxTextExtractor,
    ocr: Arc<dyn OcrEngine>,
    storage: Arc<dyn FileStorage>,
    fallback_message: String,
}

impl std::fmt::Debug for TemplateImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateImporter")
            .field("ocr", &self.ocr.name())
            .field("fallback_message", &self.fallback_message)
            .finish_non_exhaustive()
    }
}

impl TemplateImporter {
    #[must_use]
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        storage: Arc<dyn FileStorage>,
        fallback_message: impl Into<String>,
    ) -> Self {
        Self {
            extractor: DocxTextExtractor::new(),
            ocr,
            storage,
            fallback_message: fallback_message.into(),
        }
    }

    /// Run the upload pipeline.
    ///
    /// # Errors
    ///
    /// - `FormatError` for bytes that are neither a container nor a raster image
    /// - `ValidationError` when any placeholder is invalid; nothing is stored
    /// - storage errors when saving the upload
    pub async fn import(&self, upload: &Upload) -> Result<ImportOutcome> {
        let kind = classify_upload(&upload.bytes, upload.media_type.as_deref())?;
        debug!("Importing {} as {kind:?}", upload.filename);

        let layer = self.text_layer(kind, &upload.bytes).await?;
        let text_vars = if layer.text.trim().is_empty() {
            Vec::new()
        } else {
            detect_variables(&layer.text, VariableSource::DetectedFromText)?
        };

        let mut template_text = layer.text.clone();
        let mut ocr_vars = Vec::new();
        let mut extraction_degraded = false;
        if layer.text.trim().is_empty() {
            match self.ocr_text(layer.image.as_ref()).await {
                Some(text) => {
                    ocr_vars = detect_variables(&text, VariableSource::DetectedFromOcr)?;
                    template_text = text;
                }
                None => {
                    template_text = self.fallback_message.clone();
                    extraction_degraded = true;
                }
            }
        }

        let detected_variables = unify([text_vars.as_slice(), ocr_vars.as_slice()]);

        let stored_file_ref = self.storage.save(&upload.bytes, &upload.filename).await?;
        let thumbnail_ref = match layer.image {
            Some((bytes, _)) => self.save_thumbnail(bytes, &upload.filename).await,
            None => None,
        };

        info!(
            "Imported {} as {} ({} variables{})",
            upload.filename,
            stored_file_ref,
            detected_variables.len(),
            if extraction_degraded { ", text not extracted" } else { "" }
        );
        Ok(ImportOutcome {
            template_text,
            detected_variables,
            stored_file_ref,
            thumbnail_ref,
            extraction_degraded,
        })
    }

    async fn text_layer(&self, kind: UploadKind, bytes: &[u8]) -> Result<TextLayer> {
        match kind {
            UploadKind::Image(format) => Ok(TextLayer {
                text: String::new(),
                image: Some((bytes.to_vec(), extension(format))),
            }),
            UploadKind::Container => {
                let extractor = self.extractor;
                let owned = bytes.to_vec();
                run_blocking(move || {
                    let text = match extractor.extract_text(&owned) {
                        Ok(text) => text,
                        Err(e) if e.is_degradable() => {
                            warn!("Text extraction failed, trying OCR: {e}");
                            String::new()
                        }
                        Err(e) => return Err(e),
                    };
                    let image = if text.trim().is_empty() {
                        extractor
                            .first_media_image(&owned)
                            .unwrap_or_else(|e| {
                                warn!("Could not look for embedded images: {e}");
                                None
                            })
                            .map(|media| {
                                let ext = media.extension().to_string();
                                (media.bytes, ext)
                            })
                    } else {
                        None
                    };
                    Ok(TextLayer { text, image })
                })
                .await
            }
        }
    }

    /// OCR the image, `None` on any failure or empty output.
    async fn ocr_text(&self, image: Option<&(Vec<u8>, String)>) -> Option<String> {
        let Some((bytes, ext)) = image else {
            warn!("No text layer and no image to OCR");
            return None;
        };

        let file = match write_temp_image(bytes, ext) {
            Ok(file) => file,
            Err(e) => {
                warn!("Could not stage image for OCR: {e}");
                return None;
            }
        };
        match self.ocr.recognize(file.path()).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!("{} recognized {} chars", self.ocr.name(), text.len());
                Some(text)
            }
            Ok(_) => {
                warn!("OCR returned no text");
                None
            }
            Err(e) => {
                warn!("OCR failed, falling back to manual variables: {e}");
                None
            }
        }
    }

    /// Store a PNG thumbnail; failures are logged only.
    async fn save_thumbnail(&self, image_bytes: Vec<u8>, filename: &str) -> Option<FileRef> {
        let png = match run_blocking(move || thumbnail_png(&image_bytes)).await {
            Ok(png) => png,
            Err(e) => {
                warn!("Thumbnail generation failed: {e}");
                return None;
            }
        };
        let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
        match self.storage.save(&png, &format!("{stem}_thumb.png")).await {
            Ok(file_ref) => Some(file_ref),
            Err(e) => {
                warn!("Thumbnail could not be stored: {e}");
                None
            }
        }
    }
}

fn extension(format: ImageFormat) -> String {
    format
        .extensions_str()
        .first()
        .copied()
        .unwrap_or("img")
        .to_string()
}

fn write_temp_image(bytes: &[u8], ext: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("docmerge-ocr-")
        .suffix(&format!(".{ext}"))
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// Downscale to fit a `THUMBNAIL_SIZE` square and encode as PNG
pub fn thumbnail_png(image_bytes: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| DocmergeError::ExtractionError(format!("image decode failed: {e}")))?;
    let thumb = image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
    let mut buffer = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| DocmergeError::ExtractionError(format!("thumbnail encode failed: {e}")))?;
    Ok(buffer)
}

//! Common test utilities and fixtures

#![allow(dead_code)]

use docmerge_ocr::{OcrEngine, OcrError};
use image::{ImageBuffer, ImageFormat, RgbImage};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Container with one paragraph per line of `paragraphs` and optional media
pub fn docx(paragraphs: &[&str], media: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| {
            format!(
                r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                text.replace('&', "&amp;").replace('<', "&lt;")
            )
        })
        .collect();

    let options = SimpleFileOptions::default();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("[Content_Types].xml", options.clone()).unwrap();
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
        .unwrap();
    zip.start_file("word/document.xml", options.clone()).unwrap();
    zip.write_all(
        format!(r#"<w:document xmlns:w="{W_NS}"><w:body>{body}</w:body></w:document>"#).as_bytes(),
    )
    .unwrap();
    for (name, bytes) in media {
        zip.start_file(format!("word/media/{name}"), options.clone()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Blank PNG of the given size
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, image::Rgb([255, 255, 255]));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// OCR engine answering with a canned result and recording its inputs
#[derive(Debug)]
pub struct ScriptedOcr {
    text: Option<String>,
    calls: AtomicUsize,
    extensions: Mutex<Vec<String>>,
}

impl ScriptedOcr {
    pub fn recognizing(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
            extensions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
            extensions: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Extensions of the files handed to `recognize`
    pub fn extensions(&self) -> Vec<String> {
        self.extensions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(image.exists(), "OCR input must exist while recognizing");
        let ext = image
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.extensions.lock().unwrap().push(ext);
        self.text.clone().ok_or_else(|| OcrError::SubprocessFailure {
            code: Some(1),
            stderr: "Error in pixReadStream".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

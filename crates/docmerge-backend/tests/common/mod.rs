//! Common test utilities and fixtures

#![allow(dead_code)]

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Builds minimal but valid DOCX containers
#[derive(Debug, Default)]
pub struct DocxBuilder {
    paragraphs: Vec<String>,
    headers: Vec<String>,
    media: Vec<(String, Vec<u8>)>,
    stored: bool,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paragraph with one plain run
    pub fn text(self, text: &str) -> Self {
        let run = format!(
            r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
            xml_escape(text)
        );
        self.paragraph_xml(&run)
    }

    /// Paragraph made of runs `(properties, text)`, e.g. `("<w:i/>", "{{fir")`
    pub fn runs(self, runs: &[(&str, &str)]) -> Self {
        let xml: String = runs
            .iter()
            .map(|(props, text)| {
                let props = if props.is_empty() {
                    String::new()
                } else {
                    format!("<w:rPr>{props}</w:rPr>")
                };
                format!(
                    r#"<w:r>{props}<w:t xml:space="preserve">{}</w:t></w:r>"#,
                    xml_escape(text)
                )
            })
            .collect();
        self.paragraph_xml(&xml)
    }

    /// Paragraph with raw inner XML
    pub fn paragraph_xml(mut self, inner: &str) -> Self {
        self.paragraphs.push(format!("<w:p>{inner}</w:p>"));
        self
    }

    /// Header part with one plain paragraph
    pub fn header(mut self, text: &str) -> Self {
        self.headers.push(format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            xml_escape(text)
        ));
        self
    }

    /// Embedded image under `word/media/`
    pub fn media(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.media.push((format!("word/media/{name}"), bytes));
        self
    }

    /// Store parts uncompressed
    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let method = if self.stored {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = SimpleFileOptions::default().compression_method(method);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let mut put = |name: &str, bytes: &[u8]| {
            zip.start_file(name, options.clone()).expect("start part");
            zip.write_all(bytes).expect("write part");
        };

        put("[Content_Types].xml", CONTENT_TYPES.as_bytes());
        put("_rels/.rels", ROOT_RELS.as_bytes());
        put(
            "word/document.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
                self.paragraphs.concat()
            )
            .as_bytes(),
        );
        for (i, header) in self.headers.iter().enumerate() {
            put(
                &format!("word/header{}.xml", i + 1),
                format!(r#"<w:hdr xmlns:w="{W_NS}">{header}</w:hdr>"#).as_bytes(),
            );
        }
        for (name, bytes) in &self.media {
            put(name, bytes);
        }

        zip.finish().expect("finish container").into_inner()
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

pub fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Read one part of a container as text
pub fn read_part(bytes: &[u8], name: &str) -> String {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid container");
    let mut part = archive.by_name(name).expect("part exists");
    let mut xml = String::new();
    part.read_to_string(&mut xml).expect("utf-8 part");
    xml
}

//! HTML preview of a merged document.

use crate::text::{DocxTextExtractor, TextExtractor};
use docmerge_core::Result;
use tracing::warn;

/// Inline style of the preview wrapper
pub const PREVIEW_STYLE: &str = "font-family: Calibri, Arial, sans-serif; font-size: 11pt; \
line-height: 1.4; max-width: 816px; margin: 0 auto; padding: 48px; background: #fff; \
color: #222; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.2);";

/// Renders a container as a styled HTML fragment
#[derive(Debug, Clone, Default)]
pub struct PreviewRenderer<E: TextExtractor = DocxTextExtractor> {
    extractor: E,
}

impl PreviewRenderer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            extractor: DocxTextExtractor::new(),
        }
    }
}

impl<E: TextExtractor> PreviewRenderer<E> {
    /// Renderer backed by a custom extractor
    pub const fn with_extractor(extractor: E) -> Self {
        Self { extractor }
    }

    /// HTML fragment for `bytes`. Conversion warnings are logged only.
    ///
    /// # Errors
    ///
    /// `FormatError` for non-container bytes, archive errors for unreadable
    /// containers.
    pub fn render(&self, bytes: &[u8]) -> Result<String> {
        let conversion = self.extractor.convert_to_html(bytes)?;
        for warning in &conversion.warnings {
            warn!("Preview conversion warning: {warning}");
        }
        Ok(format!(
            r#"<div class="docmerge-preview" style="{PREVIEW_STYLE}">{}</div>"#,
            conversion.html
        ))
    }
}

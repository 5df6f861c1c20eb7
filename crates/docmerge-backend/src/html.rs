//! DOCX → HTML conversion for previews.
//!
//! Covers what a merged form letter needs to look right in a browser:
//! headings, paragraphs, bold/italic/underline runs, tables and line breaks.
//! Headers and footers are rendered around the body. Anything the converter
//! cannot parse is reported as a warning and skipped.

use crate::container::{self, DOCUMENT_PART};
use crate::xml::{check_val_off, get_attr, unescape_text};
use docmerge_core::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

/// HTML produced from a container plus non-fatal conversion warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlConversion {
    pub html: String,
    pub warnings: Vec<String>,
}

/// Escape `&`, `<`, `>` and `"` for HTML text and attribute content
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(ch),
        }
    }
    result
}

/// Heading level for a paragraph style id (`Heading2` → 2, `Title` → 1)
fn heading_level(style_id: &str) -> Option<u8> {
    if style_id.eq_ignore_ascii_case("title") {
        return Some(1);
    }
    let lower = style_id.to_ascii_lowercase();
    let digits = lower.strip_prefix("heading")?.trim_start_matches(' ');
    match digits.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RunFormat {
    bold: bool,
    italic: bool,
    underline: bool,
}

impl RunFormat {
    fn wrap(self, text: &str) -> String {
        let mut html = escape_html(text);
        if self.underline {
            html = format!("<u>{html}</u>");
        }
        if self.italic {
            html = format!("<em>{html}</em>");
        }
        if self.bold {
            html = format!("<strong>{html}</strong>");
        }
        html
    }
}

/// Walk state for one part
#[derive(Debug, Default)]
struct HtmlWalkState {
    out: String,
    /// Paragraph content being built, innermost last
    paragraphs: Vec<(Option<u8>, String)>,
    format: RunFormat,
    in_run_props: bool,
    in_text: bool,
}

impl HtmlWalkState {
    fn sink(&mut self) -> &mut String {
        match self.paragraphs.last_mut() {
            Some((_, content)) => content,
            None => &mut self.out,
        }
    }

    fn handle_start(&mut self, e: &BytesStart) {
        match e.name().as_ref() {
            b"w:p" => self.paragraphs.push((None, String::new())),
            b"w:r" => self.format = RunFormat::default(),
            b"w:rPr" => self.in_run_props = true,
            b"w:t" => self.in_text = true,
            b"w:tbl" => self.sink().push_str("<table>"),
            b"w:tr" => self.sink().push_str("<tr>"),
            b"w:tc" => self.sink().push_str("<td>"),
            _ => self.handle_empty(e),
        }
    }

    fn handle_empty(&mut self, e: &BytesStart) {
        match e.name().as_ref() {
            b"w:pStyle" => {
                if let (Some(style), Some((level, _))) =
                    (get_attr(e, b"w:val"), self.paragraphs.last_mut())
                {
                    *level = heading_level(&style);
                }
            }
            b"w:b" if self.in_run_props => self.format.bold = !check_val_off(e),
            b"w:i" if self.in_run_props => self.format.italic = !check_val_off(e),
            b"w:u" if self.in_run_props => self.format.underline = !check_val_off(e),
            b"w:br" | b"w:cr" => self.sink().push_str("<br/>"),
            b"w:tab" => self.sink().push('\t'),
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &[u8]) {
        match name {
            b"w:rPr" => self.in_run_props = false,
            b"w:t" => self.in_text = false,
            b"w:p" => {
                if let Some((level, content)) = self.paragraphs.pop() {
                    let html = match level {
                        Some(level) => format!("<h{level}>{content}</h{level}>"),
                        None => format!("<p>{content}</p>"),
                    };
                    self.sink().push_str(&html);
                }
            }
            b"w:tc" => self.sink().push_str("</td>"),
            b"w:tr" => self.sink().push_str("</tr>"),
            b"w:tbl" => self.sink().push_str("</table>"),
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        if self.in_text {
            let html = self.format.wrap(text);
            self.sink().push_str(&html);
        }
    }
}

/// Convert one part's XML to HTML
fn part_to_html(xml: &str) -> std::result::Result<String, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut state = HtmlWalkState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => state.handle_start(&e),
            Ok(Event::Empty(e)) => state.handle_empty(&e),
            Ok(Event::End(e)) => state.handle_end(e.name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = unescape_text(&e).map_err(|e| e.to_string())?;
                state.handle_text(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("at byte {}: {e}", reader.buffer_position())),
            _ => {}
        }
    }

    Ok(state.out)
}

/// Convert a container. Callers check the signature first.
pub(crate) fn convert(bytes: &[u8]) -> Result<HtmlConversion> {
    let mut archive = container::open_archive(bytes)?;
    let mut conversion = HtmlConversion::default();
    let (mut headers, mut body, mut footers) = (String::new(), String::new(), String::new());

    for name in container::text_part_names(&archive) {
        let Some(xml) = container::read_part(&mut archive, &name)? else {
            continue;
        };
        let html = match part_to_html(&xml) {
            Ok(html) => html,
            Err(e) => {
                conversion.warnings.push(format!("{name}: {e}"));
                continue;
            }
        };
        let part = name.trim_start_matches("word/");
        if name == DOCUMENT_PART {
            body = html;
        } else if part.starts_with("header") {
            headers.push_str(&format!("<header>{html}</header>"));
        } else if part.starts_with("footer") {
            footers.push_str(&format!("<footer>{html}</footer>"));
        } else {
            // footnotes and endnotes follow the body
            footers.push_str(&format!("<aside>{html}</aside>"));
        }
    }

    debug!(
        "Converted container to HTML ({} chars, {} warnings)",
        headers.len() + body.len() + footers.len(),
        conversion.warnings.len()
    );
    conversion.html = format!("{headers}{body}{footers}");
    Ok(conversion)
}

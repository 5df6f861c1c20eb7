//! quick-xml helpers shared by the extraction and merge passes.

use docmerge_core::{DocmergeError, Result};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Extract an attribute value by key from an element
#[inline]
pub(crate) fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .find(|a| a.as_ref().ok().map(|x| x.key.as_ref()) == Some(key))
        .and_then(std::result::Result::ok)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// Check if w:val attribute is explicitly "0", "false" or "none" (formatting off)
#[inline]
pub(crate) fn check_val_off(e: &BytesStart) -> bool {
    matches!(
        get_attr(e, b"w:val").as_deref(),
        Some("0" | "false" | "none")
    )
}

/// Parse a part into owned events, whitespace untouched.
pub(crate) fn parse_events(xml: &str) -> Result<Vec<Event<'static>>> {
    let mut reader = Reader::from_str(xml);
    // xml:space="preserve" text must survive byte for byte
    reader.trim_text(false);

    let mut events = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => events.push(event.into_owned()),
            Err(e) => {
                return Err(DocmergeError::XmlError(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }
    Ok(events)
}

/// Serialize events back to a string.
pub(crate) fn write_events<'a, I>(events: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Event<'static>>,
{
    let mut writer = Writer::new(Vec::new());
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| DocmergeError::XmlError(e.to_string()))?;
    }
    String::from_utf8(writer.into_inner()).map_err(|e| DocmergeError::XmlError(e.to_string()))
}

/// Decoded content of a text event
pub(crate) fn unescape_text(text: &BytesText) -> Result<String> {
    text.unescape()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| DocmergeError::XmlError(e.to_string()))
}

/// Copy of a `w:t` start tag with `xml:space="preserve"` set
pub(crate) fn with_preserved_space(start: &BytesStart) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in start.attributes().flatten() {
        if attr.key.as_ref() != b"xml:space" {
            out.push_attribute(attr);
        }
    }
    out.push_attribute(("xml:space", "preserve"));
    out
}

/// Escape text for element content
pub(crate) fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

//! Run-aware placeholder rewriting for one WordprocessingML part.
//!
//! Editors split typed text into many runs (`w:r`), so `{{first name}}` is
//! often stored as `{{fir` + `st na` + `me}}` with different properties on
//! each piece. Rewriting happens in two passes over the event list:
//!
//! 1. **Collapse**: inside every paragraph, characters of a placeholder that
//!    starts in one `w:t` and ends in a later one are moved into the `w:t`
//!    where it starts. The run of the opening braces keeps its `w:rPr`, so
//!    the substituted value inherits that formatting. Break elements
//!    (`w:br`, `w:cr`, `w:tab`) take part in the paragraph text as the
//!    characters the extractor reads them as. Text never moves across them:
//!    a variable whose braces enclose a break is narrowed to its leading
//!    token, and the prose after the break is dropped with the break.
//! 2. **Substitute**: each `w:t` is scanned for placeholders whose canonical
//!    name is in the merge set; they are replaced by the resolved fragment.
//!    Text fragments are escaped in place. Markup fragments close the
//!    enclosing `w:t`/`w:r`, emit their markup and reopen an identical run.
//!
//! Both passes rewrite events in place (a dropped break becomes an empty text
//! event), so indices recorded by the index pass stay valid throughout.

use crate::helpers::Fragment;
use crate::text::break_char;
use crate::xml::{escape, unescape_text, with_preserved_space, write_events};
use docmerge_core::placeholder::{self, TokenKind};
use docmerge_core::Result;
use quick_xml::events::{BytesText, Event};
use tracing::{debug, warn};

/// One `w:t` text node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextSlot {
    /// Index of the `w:t` start event
    start: usize,
    /// Index of the text event
    text: usize,
    /// Index of the enclosing `w:r` start event
    run: Option<usize>,
    /// Whether that run sits directly under `w:p`
    run_in_paragraph: bool,
}

/// Paragraph content in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Text(TextSlot),
    /// Break element directly inside a run and the character it reads as
    Break { index: usize, ch: char },
}

impl Piece {
    const fn slot(&self) -> Option<&TextSlot> {
        match self {
            Self::Text(slot) => Some(slot),
            Self::Break { .. } => None,
        }
    }
}

/// Group text slots and breaks by innermost paragraph.
///
/// Paragraphs nested in text boxes are separate groups; their text never
/// joins the text of the paragraph that hosts the text box.
fn index_paragraphs(events: &[Event<'static>]) -> Vec<Vec<Piece>> {
    let mut done = Vec::new();
    let mut open: Vec<Vec<Piece>> = Vec::new();
    let mut elements: Vec<Vec<u8>> = Vec::new();
    let mut runs: Vec<(usize, bool)> = Vec::new();
    let mut text_start: Option<usize> = None;

    for (index, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"w:p" => open.push(Vec::new()),
                    b"w:r" => {
                        let in_paragraph = elements.last().is_some_and(|n| n == b"w:p");
                        runs.push((index, in_paragraph));
                    }
                    b"w:t" => text_start = Some(index),
                    _ => {}
                }
                elements.push(name);
            }
            Event::End(e) => {
                match e.name().as_ref() {
                    b"w:p" => {
                        if let Some(pieces) = open.pop() {
                            if pieces.iter().any(|p| p.slot().is_some()) {
                                done.push(pieces);
                            }
                        }
                    }
                    b"w:r" => {
                        runs.pop();
                    }
                    b"w:t" => text_start = None,
                    _ => {}
                }
                elements.pop();
            }
            Event::Empty(e) if elements.last().is_some_and(|n| n == b"w:r") => {
                if let (Some(ch), Some(paragraph)) = (break_char(e.name().as_ref()), open.last_mut())
                {
                    paragraph.push(Piece::Break { index, ch });
                }
            }
            Event::Text(_) => {
                if let (Some(start), Some(paragraph)) = (text_start, open.last_mut()) {
                    let (run, run_in_paragraph) = runs
                        .last()
                        .map_or((None, false), |(i, direct)| (Some(*i), *direct));
                    paragraph.push(Piece::Text(TextSlot {
                        start,
                        text: index,
                        run,
                        run_in_paragraph,
                    }));
                }
            }
            _ => {}
        }
    }

    done
}

fn slot_text(events: &[Event<'static>], slot: &TextSlot) -> Result<String> {
    match &events[slot.text] {
        Event::Text(text) => unescape_text(text),
        _ => Ok(String::new()),
    }
}

fn piece_text(events: &[Event<'static>], piece: &Piece) -> Result<String> {
    match piece {
        Piece::Text(slot) => slot_text(events, slot),
        Piece::Break { ch, .. } => Ok(ch.to_string()),
    }
}

/// Replace a slot's text with escaped `text` (already escaped when `raw`)
fn set_slot_text(events: &mut [Event<'static>], slot: &TextSlot, text: String, raw: bool) {
    let content = if raw { text } else { escape(&text) };
    events[slot.text] = Event::Text(BytesText::from_escaped(content));
    let preserved = match &events[slot.start] {
        Event::Start(start) => Some(with_preserved_space(start)),
        _ => None,
    };
    if let Some(start) = preserved {
        events[slot.start] = Event::Start(start);
    }
}

/// What the collapse does with one placeholder spanning several pieces
#[derive(Debug, Clone, PartialEq, Eq)]
enum SpanAction {
    /// Move every character into the owning text node
    Move,
    /// Write `{{name}}` into the owning text node, drop the rest of the span
    Narrow(String),
    /// Leave the span where it is
    Keep,
}

#[derive(Debug)]
struct Span {
    start: usize,
    end: usize,
    owner: usize,
    action: SpanAction,
}

/// Move split placeholders into the text node where they start.
///
/// Returns whether the paragraph changed.
fn collapse_paragraph(events: &mut [Event<'static>], pieces: &[Piece]) -> Result<bool> {
    let texts = pieces
        .iter()
        .map(|piece| piece_text(events, piece))
        .collect::<Result<Vec<_>>>()?;

    // piece boundaries in the joined text
    let mut bounds = Vec::with_capacity(texts.len());
    let mut offset = 0;
    for text in &texts {
        bounds.push((offset, offset + text.len()));
        offset += text.len();
    }
    let joined = texts.concat();
    let piece_at = |pos: usize| {
        bounds
            .iter()
            .position(|&(start, end)| pos >= start && pos < end)
            .unwrap_or(bounds.len().saturating_sub(1))
    };

    let spans: Vec<Span> = placeholder::find_placeholders(&joined)
        .filter_map(|found| {
            let owner = piece_at(found.start);
            if found.end <= bounds[owner].1 {
                return None;
            }
            let last = piece_at(found.end - 1);
            let crosses_break = pieces[owner..=last]
                .iter()
                .any(|p| matches!(p, Piece::Break { .. }));
            let action = if !crosses_break {
                SpanAction::Move
            } else if let TokenKind::Variable(name) = placeholder::classify(found.inner) {
                SpanAction::Narrow(format!("{{{{{name}}}}}"))
            } else {
                SpanAction::Keep
            };
            Some(Span {
                start: found.start,
                end: found.end,
                owner,
                action,
            })
        })
        .filter(|span| span.action != SpanAction::Keep)
        .collect();
    if spans.is_empty() {
        return Ok(false);
    }

    let mut rebuilt = vec![String::new(); texts.len()];
    let mut dropped = vec![false; texts.len()];
    let mut spans_iter = spans.iter().peekable();
    for (index, (text, &(piece_start, _))) in texts.iter().zip(&bounds).enumerate() {
        for (local, ch) in text.char_indices() {
            let pos = piece_start + local;
            while spans_iter.peek().is_some_and(|span| span.end <= pos) {
                spans_iter.next();
            }
            let span = spans_iter
                .peek()
                .filter(|span| pos >= span.start && pos < span.end);
            match span {
                Some(Span {
                    action: SpanAction::Narrow(marker),
                    owner,
                    start,
                    ..
                }) => {
                    if pos == *start {
                        rebuilt[*owner].push_str(marker);
                    }
                    dropped[index] = true;
                }
                Some(Span { owner, .. }) => rebuilt[*owner].push(ch),
                None => rebuilt[index].push(ch),
            }
        }
    }

    for (index, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Text(slot) => {
                if texts[index] != rebuilt[index] {
                    set_slot_text(events, slot, std::mem::take(&mut rebuilt[index]), false);
                }
            }
            Piece::Break { index: event, .. } => {
                if dropped[index] {
                    events[*event] = Event::Text(BytesText::from_escaped(""));
                }
            }
        }
    }
    debug!("Collapsed {} split placeholder(s) in one paragraph", spans.len());
    Ok(true)
}

/// Serialized `<w:r …>` start tag and `w:rPr` element of a run
#[derive(Debug, Default)]
struct RunShape {
    open: String,
    props_inner: Option<String>,
}

impl RunShape {
    fn of(events: &[Event<'static>], run: usize) -> Result<Self> {
        let open = write_events([&events[run]])?;
        let mut props_inner = None;

        // skip indentation between <w:r> and its first child
        let first = (run + 1..events.len())
            .find(|&i| !matches!(&events[i], Event::Text(t) if t.iter().all(u8::is_ascii_whitespace)))
            .unwrap_or(events.len());
        match events.get(first) {
            Some(Event::Start(e)) if e.name().as_ref() == b"w:rPr" => {
                let mut depth = 0usize;
                let mut end = first + 1;
                while let Some(event) = events.get(end) {
                    match event {
                        Event::Start(_) => depth += 1,
                        Event::End(_) if depth == 0 => break,
                        Event::End(_) => depth -= 1,
                        _ => {}
                    }
                    end += 1;
                }
                props_inner = Some(write_events(&events[first + 1..end])?);
            }
            Some(Event::Empty(e)) if e.name().as_ref() == b"w:rPr" => {
                props_inner = Some(String::new());
            }
            _ => {}
        }

        Ok(Self { open, props_inner })
    }

    fn props_with(&self, extra: &str) -> String {
        match (&self.props_inner, extra.is_empty()) {
            (None, true) => String::new(),
            (inner, _) => format!(
                "<w:rPr>{}{extra}</w:rPr>",
                inner.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Markup that ends the current text node and run
    const CLOSE: &'static str = "</w:t></w:r>";

    /// Markup that reopens the run with its original properties
    fn reopen(&self) -> String {
        format!(
            r#"{}{}<w:t xml:space="preserve">"#,
            self.open,
            self.props_with("")
        )
    }

    fn formatted_run(&self, text: &str, extra: &str) -> String {
        format!(
            r#"{}{}<w:t xml:space="preserve">{}</w:t></w:r>"#,
            self.open,
            self.props_with(extra),
            escape(text)
        )
    }
}

/// Escaped text and raw markup for a fragment spliced inside a run.
struct Splice<'a> {
    shape: &'a RunShape,
    allow_paragraph: bool,
    out: String,
    /// Whether `out` is currently inside an open `w:t`
    in_text: bool,
}

impl Splice<'_> {
    fn text(&mut self, text: &str) {
        if !self.in_text {
            self.out.push_str(&self.shape.reopen());
            self.in_text = true;
        }
        self.out.push_str(&escape(text));
    }

    fn markup(&mut self, markup: &str) {
        if self.in_text {
            self.out.push_str(RunShape::CLOSE);
            self.in_text = false;
        }
        self.out.push_str(markup);
    }

    fn push(&mut self, fragment: &Fragment) {
        match fragment {
            Fragment::Text(text) => self.text(text),
            Fragment::Formatted { text, props } => {
                let run = self.shape.formatted_run(text, props);
                self.markup(&run);
            }
            Fragment::Markup(markup) => self.markup(markup),
            Fragment::ParagraphMarkup(markup) => {
                if self.allow_paragraph {
                    self.markup(markup);
                } else {
                    warn!("Paragraph-level helper output dropped: run is not a direct paragraph child");
                }
            }
            Fragment::Concat(parts) => parts.iter().for_each(|part| self.push(part)),
        }
    }

    fn finish(mut self) -> String {
        // the original </w:t></w:r> that follows closes the last reopened run
        if !self.in_text {
            self.out.push_str(&self.shape.reopen());
        }
        self.out
    }
}

/// Substitute placeholders inside one text node.
fn substitute_slot<F>(events: &mut [Event<'static>], slot: &TextSlot, resolve: &mut F) -> Result<usize>
where
    F: FnMut(&str) -> Option<Fragment>,
{
    let text = slot_text(events, slot)?;
    let mut pieces: Vec<Fragment> = Vec::new();
    let mut last = 0;
    let mut replaced = 0;

    for found in placeholder::find_placeholders(&text) {
        let TokenKind::Variable(name) = placeholder::classify(found.inner) else {
            continue;
        };
        let Some(fragment) = resolve(&name) else {
            continue;
        };
        pieces.push(Fragment::Text(text[last..found.start].to_string()));
        pieces.push(fragment);
        last = found.end;
        replaced += 1;
    }
    if replaced == 0 {
        return Ok(0);
    }
    pieces.push(Fragment::Text(text[last..].to_string()));

    let all_text = pieces.iter().all(Fragment::is_text);
    let run = match slot.run {
        Some(run) if !all_text => run,
        run => {
            if run.is_none() && !all_text {
                warn!("Text node outside a run, helper markup rendered as plain text");
            }
            let plain: String = pieces.iter().map(Fragment::plain_text).collect();
            set_slot_text(events, slot, plain, false);
            return Ok(replaced);
        }
    };

    let shape = RunShape::of(events, run)?;
    let mut splice = Splice {
        shape: &shape,
        allow_paragraph: slot.run_in_paragraph,
        out: String::new(),
        in_text: true,
    };
    for piece in &pieces {
        splice.push(piece);
    }
    set_slot_text(events, slot, splice.finish(), true);
    Ok(replaced)
}

/// Collapse split placeholders, then substitute every placeholder for which
/// `resolve` returns a fragment. Returns the number of substitutions.
///
/// # Errors
///
/// `XmlError` when a text node cannot be decoded or a run re-serialized.
pub fn rewrite_part<F>(events: &mut [Event<'static>], mut resolve: F) -> Result<usize>
where
    F: FnMut(&str) -> Option<Fragment>,
{
    let paragraphs = index_paragraphs(events);

    let mut collapsed = 0;
    for pieces in &paragraphs {
        if pieces.len() > 1 && collapse_paragraph(events, pieces)? {
            collapsed += 1;
        }
    }
    if collapsed > 0 {
        debug!("{collapsed} paragraph(s) had placeholders split across runs");
    }

    let mut replaced = 0;
    for slot in paragraphs.iter().flatten().filter_map(Piece::slot) {
        replaced += substitute_slot(events, slot, &mut resolve)?;
    }
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::part_text;
    use crate::xml::parse_events;

    fn rewrite(xml: &str, resolve: impl FnMut(&str) -> Option<Fragment>) -> (String, usize) {
        let mut events = parse_events(xml).unwrap();
        let count = rewrite_part(&mut events, resolve).unwrap();
        (write_events(&events).unwrap(), count)
    }

    fn text_values(name: &str) -> Option<Fragment> {
        match name {
            "first_name" => Some(Fragment::Text("Ana & Bo".into())),
            "code_1" => Some(Fragment::Text(String::new())),
            _ => None,
        }
    }

    #[test]
    fn test_single_run_substitution_escapes_value() {
        let (xml, count) = rewrite(
            "<w:p><w:r><w:t>Hi {{first name}}!</w:t></w:r></w:p>",
            text_values,
        );
        assert_eq!(count, 1);
        assert_eq!(
            xml,
            r#"<w:p><w:r><w:t xml:space="preserve">Hi Ana &amp; Bo!</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_split_placeholder_keeps_first_run_properties() {
        let source = concat!(
            "<w:p>",
            "<w:r><w:t xml:space=\"preserve\">Dear </w:t></w:r>",
            "<w:r><w:rPr><w:i/><w:sz w:val=\"28\"/></w:rPr><w:t>{{first</w:t></w:r>",
            "<w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\"> na</w:t></w:r>",
            "<w:r><w:t>me}}, welcome</w:t></w:r>",
            "</w:p>"
        );
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert!(
            xml.contains(r#"<w:rPr><w:i/><w:sz w:val="28"/></w:rPr><w:t xml:space="preserve">Ana &amp; Bo</w:t>"#),
            "{xml}"
        );
        assert!(xml.contains(r#"<w:t xml:space="preserve">, welcome</w:t>"#), "{xml}");
        assert_eq!(part_text(&xml).unwrap(), "Dear Ana & Bo, welcome");
    }

    #[test]
    fn test_unknown_and_directive_placeholders_left_alone() {
        let source = "<w:p><w:r><w:t>{{other}} {{CMD_NODE foreach}} {{code-1}}</w:t></w:r></w:p>";
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert_eq!(part_text(&xml).unwrap(), "{{other}} {{CMD_NODE foreach}} ");
    }

    #[test]
    fn test_split_unknown_placeholder_is_still_collapsed() {
        let source = "<w:p><w:r><w:t>{{oth</w:t></w:r><w:r><w:t>er}}</w:t></w:r></w:p>";
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 0);
        assert!(xml.contains(r#"<w:t xml:space="preserve">{{other}}</w:t>"#), "{xml}");
        assert_eq!(part_text(&xml).unwrap(), "{{other}}");
    }

    #[test]
    fn test_break_inside_braces_narrows_to_leading_token() {
        let source = "<w:p><w:r><w:t>Dear {{first name</w:t><w:br/><w:t>please fill in}} soon</w:t></w:r></w:p>";
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert_eq!(part_text(&xml).unwrap(), "Dear Ana & Bo soon");
        assert!(!xml.contains("<w:br/>"), "{xml}");
    }

    #[test]
    fn test_tab_inside_split_placeholder_is_not_crossed() {
        let source = concat!(
            "<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>{{code-1</w:t><w:tab/><w:t>note</w:t></w:r>",
            "<w:r><w:t>}} end</w:t></w:r></w:p>"
        );
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert_eq!(part_text(&xml).unwrap(), " end");
        assert!(!xml.contains("<w:tab/>"), "{xml}");
    }

    #[test]
    fn test_breaks_outside_placeholders_are_kept() {
        let source = concat!(
            "<w:p><w:r><w:t>A</w:t><w:br/><w:t>{{first</w:t></w:r>",
            "<w:r><w:t xml:space=\"preserve\"> name}}</w:t></w:r></w:p>"
        );
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert!(xml.contains("<w:br/>"), "{xml}");
        assert_eq!(part_text(&xml).unwrap(), "A\nAna & Bo");
    }

    #[test]
    fn test_directive_split_by_break_is_untouched() {
        let source = "<w:p><w:r><w:t>{{CMD_NODE</w:t><w:br/><w:t>foreach}} {{first_name}}</w:t></w:r></w:p>";
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 1);
        assert_eq!(part_text(&xml).unwrap(), "{{CMD_NODE\nforeach}} Ana & Bo");
    }

    #[test]
    fn test_placeholders_never_join_across_paragraphs() {
        let source = "<w:body><w:p><w:r><w:t>{{first</w:t></w:r></w:p>\
                      <w:p><w:r><w:t>name}}</w:t></w:r></w:p></w:body>";
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 0);
        assert_eq!(xml, source);
    }

    #[test]
    fn test_formatted_fragment_reopens_run() {
        let source = "<w:p><w:r><w:rPr><w:sz w:val=\"20\"/></w:rPr><w:t>Hi {{first_name}}.</w:t></w:r></w:p>";
        let (xml, _) = rewrite(source, |_| {
            Some(Fragment::Formatted {
                text: "Ana".into(),
                props: "<w:b/>".into(),
            })
        });
        assert_eq!(
            xml,
            concat!(
                "<w:p><w:r><w:rPr><w:sz w:val=\"20\"/></w:rPr><w:t xml:space=\"preserve\">Hi ",
                "</w:t></w:r>",
                "<w:r><w:rPr><w:sz w:val=\"20\"/><w:b/></w:rPr><w:t xml:space=\"preserve\">Ana</w:t></w:r>",
                "<w:r><w:rPr><w:sz w:val=\"20\"/></w:rPr><w:t xml:space=\"preserve\">.</w:t></w:r></w:p>"
            )
        );
        assert!(parse_events(&xml).is_ok());
    }

    #[test]
    fn test_paragraph_markup_only_for_direct_runs() {
        let fragment = || {
            Some(Fragment::Concat(vec![
                Fragment::Text("A".into()),
                Fragment::ParagraphMarkup("</w:p><w:p>".into()),
            ]))
        };

        let (xml, _) = rewrite("<w:p><w:r><w:t>{{x}}B</w:t></w:r></w:p>", |_| fragment());
        assert_eq!(part_text(&xml).unwrap(), "A\nB");

        let nested = "<w:p><w:hyperlink><w:r><w:t>{{x}}B</w:t></w:r></w:hyperlink></w:p>";
        let (xml, _) = rewrite(nested, |_| fragment());
        assert_eq!(part_text(&xml).unwrap(), "AB");
        assert!(parse_events(&xml).is_ok());
    }

    #[test]
    fn test_text_box_paragraph_is_separate() {
        let source = concat!(
            "<w:p><w:r><w:t>{{fir</w:t></w:r>",
            "<w:r><w:pict><w:txbxContent><w:p><w:r><w:t>{{code</w:t></w:r><w:r><w:t>_1}}</w:t></w:r></w:p></w:txbxContent></w:pict></w:r>",
            "<w:r><w:t>st_name}}</w:t></w:r></w:p>"
        );
        let (xml, count) = rewrite(source, text_values);
        assert_eq!(count, 2);
        assert_eq!(part_text(&xml).unwrap(), "Ana & Bo");
    }
}

//! Placeholder detection and canonical naming.
//!
//! A placeholder is any `{{ … }}` span in template text. The inner text is
//! trimmed, cut at the first line break or tab (anything after it is stray
//! prose typed inside the braces), and normalized into a canonical name:
//! whitespace/hyphen runs become one `_`, every other character outside
//! `[A-Za-z0-9_]` is dropped. Tokens carrying the reserved directive keyword
//! are control markers of the merge engine and never become variables.

use crate::error::{DocmergeError, Result};
use crate::types::{Variable, VariableSource};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Opening delimiter
pub const OPEN_DELIMITER: &str = "{{";
/// Closing delimiter
pub const CLOSE_DELIMITER: &str = "}}";
/// Keyword marking engine directives such as `{{CMD_NODE foreach}}`
pub const RESERVED_DIRECTIVE: &str = "CMD_NODE";

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("valid placeholder regex"));
static RE_SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-]+").expect("valid separator regex"));
static RE_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid charset regex"));
static RE_CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid name regex"));

/// A located placeholder occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// Byte offset of the opening `{{`
    pub start: usize,
    /// Byte offset just past the closing `}}`
    pub end: usize,
    /// Text between the delimiters, untouched
    pub inner: &'a str,
}

/// How a single placeholder token classifies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Valid data field with its canonical name
    Variable(String),
    /// Engine directive, not a data field
    Directive,
    /// Does not normalize to a valid name; carries the raw token
    Invalid(String),
}

/// Result of scanning a text for placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderScan {
    /// Canonical names, first-seen order, no duplicates
    pub names: Vec<String>,
    /// Raw tokens that failed validation, first-seen order, no duplicates
    pub invalid: Vec<String>,
}

impl PlaceholderScan {
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Iterate over every `{{ … }}` span of `text`.
pub fn find_placeholders(text: &str) -> impl Iterator<Item = Placeholder<'_>> {
    RE_PLACEHOLDER.captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        let inner = caps.get(1)?;
        Some(Placeholder {
            start: whole.start(),
            end: whole.end(),
            inner: inner.as_str(),
        })
    })
}

/// Canonical form of a token. Idempotent.
#[must_use = "normalized name is returned but not used"]
pub fn normalize(token: &str) -> String {
    let collapsed = RE_SEPARATOR_RUN.replace_all(token, "_");
    RE_DISALLOWED.replace_all(&collapsed, "").into_owned()
}

/// True if `name` is a valid canonical variable name
#[inline]
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    RE_CANONICAL.is_match(name)
}

/// Label shown to users: `first_name` → `First Name`
#[must_use]
pub fn default_label(name: &str) -> String {
    name.split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip surrounding whitespace and anything after the first line break or tab.
fn leading_token(inner: &str) -> &str {
    let trimmed = inner.trim();
    trimmed
        .split(['\n', '\r', '\t', '\u{2028}', '\u{2029}'])
        .next()
        .unwrap_or_default()
        .trim()
}

/// Classify the inner text of one placeholder.
#[must_use]
pub fn classify(inner: &str) -> TokenKind {
    let token = leading_token(inner);
    if token.contains(RESERVED_DIRECTIVE) {
        return TokenKind::Directive;
    }
    let name = normalize(token);
    if is_valid_name(&name) {
        TokenKind::Variable(name)
    } else {
        TokenKind::Invalid(token.to_string())
    }
}

/// Scan `text` and collect valid names and invalid tokens separately.
#[must_use]
pub fn scan(text: &str) -> PlaceholderScan {
    let mut result = PlaceholderScan::default();
    let mut seen_names = HashSet::new();
    let mut seen_invalid = HashSet::new();

    for placeholder in find_placeholders(text) {
        match classify(placeholder.inner) {
            TokenKind::Variable(name) => {
                if seen_names.insert(name.clone()) {
                    result.names.push(name);
                }
            }
            TokenKind::Invalid(token) => {
                if seen_invalid.insert(token.clone()) {
                    result.invalid.push(token);
                }
            }
            TokenKind::Directive => {}
        }
    }

    result
}

/// Strict extraction used on import.
///
/// # Errors
///
/// Returns [`DocmergeError::ValidationError`] with every offending raw token
/// when at least one placeholder is invalid. No partial set is returned.
pub fn extract(text: &str) -> Result<Vec<String>> {
    let scan = scan(text);
    if scan.is_valid() {
        Ok(scan.names)
    } else {
        Err(DocmergeError::ValidationError {
            tokens: scan.invalid,
        })
    }
}

/// Strict extraction producing [`Variable`]s with default labels.
///
/// # Errors
///
/// Same as [`extract`].
pub fn detect_variables(text: &str, source: VariableSource) -> Result<Vec<Variable>> {
    Ok(extract(text)?
        .into_iter()
        .map(|name| Variable::detected(name, source))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_and_labels() {
        let vars = detect_variables(
            "Hello {{first name}}, your code is {{code-1}}.",
            VariableSource::DetectedFromText,
        )
        .unwrap();
        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        let labels: Vec<_> = vars.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(names, ["first_name", "code_1"]);
        assert_eq!(labels, ["First Name", "Code 1"]);
    }

    #[test]
    fn test_directive_excluded() {
        let scan = scan("{{CMD_NODE foreach}} {{item}} {{CMD_NODE end}}");
        assert_eq!(scan.names, ["item"]);
        assert!(scan.invalid.is_empty());
    }

    #[test]
    fn test_trailing_prose_after_line_break_dropped() {
        let names = extract("{{ client\nplease fill in }} and {{client}}").unwrap();
        assert_eq!(names, ["client"]);
    }

    #[test]
    fn test_invalid_tokens_reject_import() {
        let err = extract("{{name}} {{2nd}} {{ @@ }} {{2nd}}").unwrap_err();
        match err {
            DocmergeError::ValidationError { tokens } => assert_eq!(tokens, ["2nd", "@@"]),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_braces_are_invalid() {
        let scan = scan("{{}}");
        assert!(scan.names.is_empty());
        assert_eq!(scan.invalid, [""]);
    }

    #[test]
    fn test_normalize_collapses_and_strips() {
        assert_eq!(normalize("first  -- name"), "first_name");
        assert_eq!(normalize("año"), "ao");
        assert_eq!(normalize("total($)"), "total");
        assert_eq!(normalize("a\u{a0}b"), "a_b");
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let names = extract("{{b}} {{a}} {{b}} {{ a }} {{c}}").unwrap();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_case_sensitive_names() {
        let names = extract("{{Name}} {{name}}").unwrap();
        assert_eq!(names, ["Name", "name"]);
    }

    #[test]
    fn test_find_placeholders_offsets() {
        let text = "ab{{x}}cd";
        let found: Vec<_> = find_placeholders(text).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].start..found[0].end], "{{x}}");
        assert_eq!(found[0].inner, "x");
    }

    #[test]
    fn test_default_label_skips_empty_segments() {
        assert_eq!(default_label("due__date_"), "Due Date");
        assert_eq!(default_label("x"), "X");
    }
}

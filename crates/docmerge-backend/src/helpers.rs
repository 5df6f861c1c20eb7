//! Registered value helpers.
//!
//! A helper is a pure function `(value, args) -> Fragment` looked up by name
//! when a variable carries a `format` binding. New helpers are added with
//! [`HelperRegistry::register`]; the merge core never changes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use docmerge_core::types::FormatSpec;
use docmerge_core::ScalarValue;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::warn;

/// What a helper produces for one placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Plain text, XML-escaped on insertion
    Text(String),
    /// Text in its own run: the enclosing run's properties plus `props`
    /// (run property elements such as `<w:b/>`)
    Formatted { text: String, props: String },
    /// Run-level markup placed between the closed and the reopened run
    Markup(String),
    /// Markup that closes the current paragraph and opens a new one. Only
    /// spliced where the run is a direct child of its paragraph.
    ParagraphMarkup(String),
    /// Several fragments in order
    Concat(Vec<Fragment>),
}

impl Fragment {
    /// True if the fragment is plain text only
    #[must_use]
    pub fn is_text(&self) -> bool {
        match self {
            Self::Text(_) => true,
            Self::Concat(parts) => parts.iter().all(Self::is_text),
            _ => false,
        }
    }

    /// Visible text of the fragment
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Text(text) | Self::Formatted { text, .. } => text.clone(),
            Self::Markup(_) | Self::ParagraphMarkup(_) => String::new(),
            Self::Concat(parts) => parts.iter().map(Self::plain_text).collect(),
        }
    }

    fn formatted(text: String, props: &str) -> Self {
        Self::Formatted {
            text,
            props: props.to_string(),
        }
    }
}

/// Signature of a helper
pub type HelperFn = fn(&ScalarValue, &[String]) -> Fragment;

/// Name → helper table
#[derive(Debug, Clone)]
pub struct HelperRegistry {
    helpers: HashMap<String, HelperFn>,
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HelperRegistry {
    /// Registry without any helper
    #[must_use]
    pub fn empty() -> Self {
        Self {
            helpers: HashMap::new(),
        }
    }

    /// Registry with the built-in helpers
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("date", date);
        registry.register("time", time);
        registry.register("upper", upper);
        registry.register("lower", lower);
        registry.register("bold", bold);
        registry.register("italic", italic);
        registry.register("underline", underline);
        registry.register("number", number);
        registry.register("paragraph", paragraph);
        registry.register("page_break", page_break);
        registry.register("indent", indent);
        registry.register("align", align);
        registry
    }

    /// Add or replace a helper
    pub fn register(&mut self, name: impl Into<String>, helper: HelperFn) {
        self.helpers.insert(name.into(), helper);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<HelperFn> {
        self.helpers.get(name).copied()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render `value` through the helper named by `format`, or as plain text
    /// when there is no binding. Unknown helpers fall back to plain text.
    #[must_use]
    pub fn render(&self, value: &ScalarValue, format: Option<&FormatSpec>) -> Fragment {
        let Some(format) = format else {
            return Fragment::Text(value.to_text());
        };
        match self.get(&format.helper) {
            Some(helper) => helper(value, &format.args),
            None => {
                warn!("Unknown helper '{}', using plain value", format.helper);
                Fragment::Text(value.to_text())
            }
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, default: &'a str) -> &'a str {
    args.get(index)
        .map(String::as_str)
        .filter(|a| !a.is_empty())
        .unwrap_or(default)
}

/// Format with a strftime pattern; `None` for an invalid pattern.
fn strftime(formatted: impl std::fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{formatted}").ok()?;
    Some(out)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").ok())
}

fn as_date(value: &ScalarValue) -> Option<NaiveDate> {
    match value {
        ScalarValue::Date(date) => Some(*date),
        ScalarValue::Text(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_datetime(text).map(|dt| dt.date())),
        _ => None,
    }
}

fn as_time(value: &ScalarValue) -> Option<NaiveTime> {
    let ScalarValue::Text(text) = value else {
        return None;
    };
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .ok()
        .or_else(|| NaiveTime::parse_from_str(trimmed, "%H:%M").ok())
        .or_else(|| parse_datetime(trimmed).map(|dt| dt.time()))
}

/// `date [pattern]`, default `%d/%m/%Y`
fn date(value: &ScalarValue, args: &[String]) -> Fragment {
    let pattern = arg(args, 0, "%d/%m/%Y");
    let text = as_date(value)
        .and_then(|d| strftime(d.format(pattern)))
        .unwrap_or_else(|| value.to_text());
    Fragment::Text(text)
}

/// `time [pattern]`, default `%H:%M`
fn time(value: &ScalarValue, args: &[String]) -> Fragment {
    let pattern = arg(args, 0, "%H:%M");
    let text = as_time(value)
        .and_then(|t| strftime(t.format(pattern)))
        .unwrap_or_else(|| value.to_text());
    Fragment::Text(text)
}

fn upper(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::Text(value.to_text().to_uppercase())
}

fn lower(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::Text(value.to_text().to_lowercase())
}

fn bold(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::formatted(value.to_text(), "<w:b/>")
}

fn italic(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::formatted(value.to_text(), "<w:i/>")
}

fn underline(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::formatted(value.to_text(), r#"<w:u w:val="single"/>"#)
}

/// Group the digits of an unsigned integer string
fn group_thousands(digits: &str, separator: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(ch);
    }
    out
}

/// Upper bound for the `number` helper's decimal places
pub const MAX_DECIMALS: usize = 20;

/// `number [decimals] [thousands] [decimal_point]`, defaults `2`, `,`, `.`
fn number(value: &ScalarValue, args: &[String]) -> Fragment {
    let n = match value {
        ScalarValue::Number(n) => Some(*n),
        ScalarValue::Text(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(n) = n.filter(|n| n.is_finite()) else {
        return Fragment::Text(value.to_text());
    };

    let decimals = arg(args, 0, "2")
        .parse::<usize>()
        .unwrap_or(2)
        .min(MAX_DECIMALS);
    let thousands = args.get(1).map_or(",", String::as_str);
    let point = arg(args, 2, ".");

    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut text = String::new();
    if n < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        text.push('-');
    }
    text.push_str(&group_thousands(int_part, thousands));
    if !frac_part.is_empty() {
        text.push_str(point);
        text.push_str(frac_part);
    }
    Fragment::Text(text)
}

/// Value, then a paragraph break
fn paragraph(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::Concat(vec![
        Fragment::formatted(value.to_text(), ""),
        Fragment::ParagraphMarkup("</w:p><w:p>".to_string()),
    ])
}

/// Value, then a page break
fn page_break(value: &ScalarValue, _args: &[String]) -> Fragment {
    Fragment::Concat(vec![
        Fragment::formatted(value.to_text(), ""),
        Fragment::Markup(r#"<w:r><w:br w:type="page"/></w:r>"#.to_string()),
    ])
}

/// `indent [twips]`: value starts a new paragraph indented by `twips`
/// (default 720, half an inch)
fn indent(value: &ScalarValue, args: &[String]) -> Fragment {
    let twips = arg(args, 0, "720").parse::<u32>().unwrap_or(720);
    Fragment::Concat(vec![
        Fragment::ParagraphMarkup(format!(
            r#"</w:p><w:p><w:pPr><w:ind w:left="{twips}"/></w:pPr>"#
        )),
        Fragment::formatted(value.to_text(), ""),
    ])
}

/// `align left|center|right|justify`: value starts a new aligned paragraph
fn align(value: &ScalarValue, args: &[String]) -> Fragment {
    let jc = match arg(args, 0, "left").to_ascii_lowercase().as_str() {
        "center" | "centre" => "center",
        "right" | "end" => "right",
        "justify" | "both" => "both",
        _ => "left",
    };
    Fragment::Concat(vec![
        Fragment::ParagraphMarkup(format!(
            r#"</w:p><w:p><w:pPr><w:jc w:val="{jc}"/></w:pPr>"#
        )),
        Fragment::formatted(value.to_text(), ""),
    ])
}

//! Data model shared by the importer, the merge engine and the API surfaces.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MIME type of a WordprocessingML package
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Opaque reference returned by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl FileRef {
    /// Wrap a storage key
    #[inline]
    #[must_use = "file reference is created but not used"]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the storage key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared scalar type of a variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    Text,
    Number,
    Date,
    Time,
}

/// Where a variable came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableSource {
    /// Found in the text layer of the uploaded document
    DetectedFromText,
    /// Found in OCR output of an image-only upload
    DetectedFromOcr,
    /// Added or edited by a user
    Manual,
}

/// Helper binding applied to a variable's value at substitution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatSpec {
    /// Name of a helper in the registered helper table (e.g. `date`, `bold`)
    pub helper: String,
    /// Helper arguments, e.g. a date pattern
    #[serde(default)]
    pub args: Vec<String>,
}

impl FormatSpec {
    #[must_use]
    pub fn new(helper: impl Into<String>, args: &[&str]) -> Self {
        Self {
            helper: helper.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// A template variable.
///
/// `name` is the canonical identifier and is unique within one template's
/// variable set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    pub source: VariableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatSpec>,
}

impl Variable {
    /// Create a text variable with the default label derived from `name`
    #[must_use = "variable is created but not used"]
    pub fn detected(name: impl Into<String>, source: VariableSource) -> Self {
        let name = name.into();
        let label = crate::placeholder::default_label(&name);
        Self {
            name,
            label,
            var_type: VariableType::Text,
            source,
            format: None,
        }
    }

    /// Builder-style label override
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Builder-style type override
    #[must_use]
    pub const fn with_type(mut self, var_type: VariableType) -> Self {
        self.var_type = var_type;
        self
    }

    /// Builder-style helper binding
    #[must_use]
    pub fn with_format(mut self, format: FormatSpec) -> Self {
        self.format = Some(format);
        self
    }
}

/// An uploaded template.
///
/// Immutable once created: `raw_text` and `file_ref` always describe the same
/// upload. A re-upload produces a new `Template`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub form_id: String,
    pub name: String,
    /// Text captured at upload time (or the OCR fallback message)
    pub raw_text: String,
    pub file_ref: FileRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<FileRef>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    pub created_at: DateTime<Utc>,
}

/// Scalar value stored in an [`Entry`].
///
/// JSON decoding is untagged and tried in declaration order, so `null`,
/// booleans and numbers map to their variants, `YYYY-MM-DD` strings become
/// `Date`, and every other string is `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl ScalarValue {
    /// Text used when the value is substituted without a helper.
    #[must_use = "stringified value is returned but not used"]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for ScalarValue {
    #[allow(clippy::cast_precision_loss)] // form values are far below 2^53
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<NaiveDate> for ScalarValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

// Integral values print without a trailing ".0"
#[allow(clippy::cast_possible_truncation)]
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A form submission whose values are merged into a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub form_id: String,
    #[serde(default)]
    pub values: HashMap<String, ScalarValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Create an entry stamped with the current time
    #[must_use = "entry is created but not used"]
    pub fn new(
        id: impl Into<String>,
        form_id: impl Into<String>,
        values: HashMap<String, ScalarValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            form_id: form_id.into(),
            values,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve a variable value; absent keys behave like `Null`.
    #[must_use]
    pub fn value(&self, name: &str) -> &ScalarValue {
        const NULL: &ScalarValue = &ScalarValue::Null;
        self.values.get(name).unwrap_or(NULL)
    }
}

/// Requested response shape of a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    BinaryDownload,
    HtmlPreview,
}

/// Request-scoped merge parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub template_id: String,
    pub entry_id: String,
    #[serde(default)]
    pub output_mode: OutputMode,
}

/// Payload of a merge result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutput {
    /// Merged document with download metadata
    Binary {
        bytes: Vec<u8>,
        filename: String,
        content_type: String,
    },
    /// HTML preview fragment
    Html(String),
}

/// Result of one merge request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub output: MergeOutput,
    /// True when the original template was returned because verification failed
    pub degraded: bool,
    /// Variables that failed verification
    pub unresolved_variables: Vec<String>,
}

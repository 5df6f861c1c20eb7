//! API request and response types

use docmerge_core::{Entry, FormatSpec, ScalarValue, Variable, VariableSource, VariableType};
use docmerge_pipeline::ImportOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Offending placeholder tokens of a rejected upload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

/// Response of a template upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateResponse {
    pub template_id: String,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
}

/// Manual variable as posted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVariableRequest {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default)]
    pub format: Option<FormatSpec>,
}

impl From<AddVariableRequest> for Variable {
    fn from(req: AddVariableRequest) -> Self {
        Self {
            name: req.name,
            label: req.label.unwrap_or_default(),
            var_type: req.var_type,
            source: VariableSource::Manual,
            format: req.format,
        }
    }
}

/// Entry submission for a form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub values: HashMap<String, ScalarValue>,
}

impl CreateEntryRequest {
    /// Entry stamped with the current time
    #[must_use]
    pub fn into_entry(self, form_id: &str) -> Entry {
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Entry::new(id, form_id, self.values)
    }
}

/// JSON body of an HTML-preview merge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub html: String,
    pub unresolved_variables: Vec<String>,
    pub degraded: bool,
}

/// OCR request for an image already in file storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequest {
    /// Relative to the storage root, or absolute inside it
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub text: String,
}

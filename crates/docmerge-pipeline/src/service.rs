//! Request-scoped operations over templates and entries.
//!
//! Every call names its template and entry explicitly; nothing is read from
//! ambient context.

use crate::import::{ImportOutcome, TemplateImporter, Upload};
use crate::run_blocking;
use docmerge_backend::{MergeEngine, PreviewRenderer};
use docmerge_core::placeholder::{is_valid_name, normalize};
use docmerge_core::{
    DocmergeConfig, DocmergeError, Entry, FormatSpec, MergeOutput, MergeRequest, MergeResult,
    OutputMode, Result, Template, Variable, VariableSource, VariableType, DOCX_CONTENT_TYPE,
};
use docmerge_ocr::{OcrEngine, TesseractCli};
use docmerge_storage::{
    EntryStore, FileStorage, LocalFileStorage, MemoryEntryStore, MemoryTemplateStore,
    TemplateStore,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Partial edit of a variable; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableUpdate {
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub var_type: Option<VariableType>,
    /// `Some(None)` clears the helper binding
    #[serde(default, with = "double_option")]
    pub format: Option<Option<FormatSpec>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Template import, variable editing, merge and OCR
#[derive(Clone)]
pub struct MergeService {
    importer: TemplateImporter,
    engine: Arc<MergeEngine>,
    preview: PreviewRenderer,
    storage: Arc<dyn FileStorage>,
    templates: Arc<dyn TemplateStore>,
    entries: Arc<dyn EntryStore>,
    ocr: Arc<dyn OcrEngine>,
    /// Directory direct OCR requests are confined to
    ocr_root: PathBuf,
}

impl std::fmt::Debug for MergeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeService")
            .field("importer", &self.importer)
            .field("engine", &self.engine)
            .field("ocr_root", &self.ocr_root)
            .finish_non_exhaustive()
    }
}

impl MergeService {
    /// Service over explicit collaborators
    #[must_use]
    pub fn new(
        config: &DocmergeConfig,
        storage: Arc<dyn FileStorage>,
        templates: Arc<dyn TemplateStore>,
        entries: Arc<dyn EntryStore>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            importer: TemplateImporter::new(
                Arc::clone(&ocr),
                Arc::clone(&storage),
                config.ocr.fallback_message.clone(),
            ),
            engine: Arc::new(MergeEngine::new(&config.merge)),
            preview: PreviewRenderer::new(),
            storage,
            templates,
            entries,
            ocr,
            ocr_root: config.storage.root.clone(),
        }
    }

    /// Local-disk storage, in-memory records and the configured OCR command
    #[must_use]
    pub fn from_config(config: &DocmergeConfig) -> Self {
        Self::new(
            config,
            Arc::new(LocalFileStorage::new(config.storage.root.clone())),
            Arc::new(MemoryTemplateStore::new()),
            Arc::new(MemoryEntryStore::new()),
            Arc::new(TesseractCli::new(&config.ocr)),
        )
    }

    #[must_use]
    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    /// Import an upload and record it as a new template of `form_id`.
    ///
    /// # Errors
    ///
    /// `FormatError`/`ValidationError` from the upload pipeline, storage errors.
    pub async fn create_template(
        &self,
        form_id: &str,
        name: &str,
        upload: &Upload,
    ) -> Result<(Template, ImportOutcome)> {
        let outcome = self.importer.import(upload).await?;
        let template = Template {
            id: uuid::Uuid::new_v4().to_string(),
            form_id: form_id.to_string(),
            name: name.to_string(),
            raw_text: outcome.template_text.clone(),
            file_ref: outcome.stored_file_ref.clone(),
            thumbnail_ref: outcome.thumbnail_ref.clone(),
            variables: outcome.detected_variables.clone(),
            created_at: chrono::Utc::now(),
        };
        self.templates.insert(template.clone()).await?;
        info!("Created template {} for form {form_id}", template.id);
        Ok((template, outcome))
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub async fn template(&self, template_id: &str) -> Result<Template> {
        Ok(self.templates.get(template_id).await?)
    }

    /// Add a variable by hand. The name is normalized like a detected token;
    /// an existing variable of the same name is replaced by the manual one.
    ///
    /// # Errors
    ///
    /// `ValidationError` when the name does not normalize to a valid name,
    /// `NotFound` for an unknown template.
    pub async fn add_manual_variable(
        &self,
        template_id: &str,
        mut variable: Variable,
    ) -> Result<Template> {
        let name = normalize(variable.name.trim());
        if !is_valid_name(&name) {
            return Err(DocmergeError::ValidationError {
                tokens: vec![variable.name],
            });
        }
        variable.name = name;
        variable.source = VariableSource::Manual;
        if variable.label.trim().is_empty() {
            variable.label = docmerge_core::placeholder::default_label(&variable.name);
        }

        let mut template = self.templates.get(template_id).await?;
        match template.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => template.variables.push(variable),
        }
        self.templates
            .set_variables(template_id, template.variables.clone())
            .await?;
        Ok(template)
    }

    /// Edit label, type or helper binding of an existing variable.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown template or variable.
    pub async fn update_variable(
        &self,
        template_id: &str,
        name: &str,
        update: VariableUpdate,
    ) -> Result<Template> {
        let mut template = self.templates.get(template_id).await?;
        let variable = template
            .variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| {
                DocmergeError::NotFound(format!("variable {name} in template {template_id}"))
            })?;

        if let Some(label) = update.label {
            variable.label = label;
        }
        if let Some(var_type) = update.var_type {
            variable.var_type = var_type;
        }
        if let Some(format) = update.format {
            variable.format = format;
        }
        variable.source = VariableSource::Manual;

        self.templates
            .set_variables(template_id, template.variables.clone())
            .await?;
        Ok(template)
    }

    /// Store or replace an entry
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn put_entry(&self, entry: Entry) -> Result<()> {
        Ok(self.entries.put(entry).await?)
    }

    /// Merge one entry into one template.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids or an entry of another form, `FormatError`
    /// for a stored file that is not a container. Verification failures are
    /// reported through `MergeResult::degraded`.
    pub async fn merge(&self, request: &MergeRequest) -> Result<MergeResult> {
        let template = self.templates.get(&request.template_id).await?;
        let entry = self.entries.get(&request.entry_id).await?;
        if entry.form_id != template.form_id {
            return Err(DocmergeError::NotFound(format!(
                "entry {} in form {}",
                entry.id, template.form_id
            )));
        }

        let bytes = self.storage.read(&template.file_ref).await?;
        let engine = Arc::clone(&self.engine);
        let (raw_text, variables) = (template.raw_text.clone(), template.variables.clone());
        let merge_entry = entry.clone();
        let outcome = run_blocking(move || {
            engine.merge(&bytes, &raw_text, &variables, &merge_entry)
        })
        .await?;
        debug!(
            "Merge of template {} with entry {}: degraded={}",
            template.id, entry.id, outcome.degraded
        );

        let output = match request.output_mode {
            OutputMode::BinaryDownload => MergeOutput::Binary {
                filename: download_name(&template.name, &entry.id),
                bytes: outcome.bytes,
                content_type: DOCX_CONTENT_TYPE.to_string(),
            },
            OutputMode::HtmlPreview => {
                let preview = self.preview.clone();
                let merged = outcome.bytes;
                MergeOutput::Html(run_blocking(move || preview.render(&merged)).await?)
            }
        };

        Ok(MergeResult {
            output,
            degraded: outcome.degraded,
            unresolved_variables: outcome.unresolved,
        })
    }

    /// Run OCR on an image under the storage root. Relative paths are
    /// resolved against the root.
    ///
    /// # Errors
    ///
    /// `NotFound` when the image does not exist or resolves outside the
    /// storage root, `SubprocessFailure` when the OCR executable fails or
    /// times out.
    pub async fn ocr(&self, path: &Path) -> Result<String> {
        let not_found = || DocmergeError::NotFound(format!("image {}", path.display()));
        let root = tokio::fs::canonicalize(&self.ocr_root)
            .await
            .map_err(|_| not_found())?;
        let image = tokio::fs::canonicalize(root.join(path))
            .await
            .map_err(|_| not_found())?;
        let is_file = tokio::fs::metadata(&image)
            .await
            .is_ok_and(|meta| meta.is_file());
        if !image.starts_with(&root) || !is_file {
            warn!("Rejected OCR of {} outside {}", image.display(), root.display());
            return Err(not_found());
        }
        Ok(self.ocr.recognize(&image).await?)
    }
}

/// `<template name>-<entry id>.docx` with unsafe characters replaced
fn download_name(template_name: &str, entry_id: &str) -> String {
    let stem = template_name
        .strip_suffix(".docx")
        .unwrap_or(template_name);
    let safe: String = format!("{stem}-{entry_id}")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.docx")
}

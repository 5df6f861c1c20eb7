//! Template and entry lookup.
//!
//! Persistence of forms and entries belongs to the host application; these
//! traits are the slice of it the merge service needs.

use crate::{StorageError, StorageResult};
use docmerge_core::{Entry, Template, Variable};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Template records
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, template_id: &str) -> StorageResult<Template>;

    /// Insert a new template; ids are never reused
    async fn insert(&self, template: Template) -> StorageResult<()>;

    /// Replace the variable set of a template (content stays immutable)
    async fn set_variables(&self, template_id: &str, variables: Vec<Variable>)
        -> StorageResult<()>;
}

/// Entry records
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync {
    async fn get(&self, entry_id: &str) -> StorageResult<Entry>;

    /// Insert or replace an entry
    async fn put(&self, entry: Entry) -> StorageResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl MemoryTemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get(&self, template_id: &str) -> StorageResult<Template> {
        self.templates
            .read()
            .await
            .get(template_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("template {template_id}")))
    }

    async fn insert(&self, template: Template) -> StorageResult<()> {
        let mut templates = self.templates.write().await;
        if templates.contains_key(&template.id) {
            return Err(StorageError::Conflict(format!("template {}", template.id)));
        }
        templates.insert(template.id.clone(), template);
        Ok(())
    }

    async fn set_variables(
        &self,
        template_id: &str,
        variables: Vec<Variable>,
    ) -> StorageResult<()> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(template_id)
            .ok_or_else(|| StorageError::NotFound(format!("template {template_id}")))?;
        template.variables = variables;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryEntryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get(&self, entry_id: &str) -> StorageResult<Entry> {
        self.entries
            .read()
            .await
            .get(entry_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("entry {entry_id}")))
    }

    async fn put(&self, entry: Entry) -> StorageResult<()> {
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }
}

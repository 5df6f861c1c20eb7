//! Merge engine.
//!
//! One merge walks a fixed state machine:
//!
//! ```text
//! LOADED → VALIDATED → SUBSTITUTED → VERIFIED → ACCEPTED
//!                                        ↘ DEGRADED
//! ```
//!
//! A bad signature is the only fatal outcome. Every later failure degrades:
//! the caller receives the original template bytes, unchanged, with the list
//! of variables that could not be resolved.

use crate::container;
use crate::helpers::{Fragment, HelperRegistry};
use crate::runs;
use crate::text::{DocxTextExtractor, TextExtractor};
use crate::working_copy::WorkingCopy;
use crate::xml::{parse_events, write_events};
use docmerge_core::placeholder::{self, OPEN_DELIMITER};
use docmerge_core::unify::extend_with_names;
use docmerge_core::{
    unify, DocmergeError, Entry, MergeConfig, Result, Variable, VariableSource,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Stage of a merge operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeState {
    Loaded,
    Validated,
    Substituted,
    Verified,
    Accepted,
    Degraded,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "LOADED",
            Self::Validated => "VALIDATED",
            Self::Substituted => "SUBSTITUTED",
            Self::Verified => "VERIFIED",
            Self::Accepted => "ACCEPTED",
            Self::Degraded => "DEGRADED",
        };
        f.write_str(name)
    }
}

/// Result of [`MergeEngine::merge`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged document, or the untouched template when degraded
    pub bytes: Vec<u8>,
    pub degraded: bool,
    /// Variables that failed verification
    pub unresolved: Vec<String>,
    /// Why the merge degraded
    pub reason: Option<String>,
    /// Number of placeholders replaced
    pub substitutions: usize,
}

/// Substitutes entry values into DOCX templates and verifies the result.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    extractor: DocxTextExtractor,
    helpers: HelperRegistry,
    min_size_ratio: f64,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new(&MergeConfig::default())
    }
}

impl MergeEngine {
    /// Engine with the built-in helpers
    #[must_use]
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            extractor: DocxTextExtractor::new(),
            helpers: HelperRegistry::with_builtins(),
            min_size_ratio: config.min_size_ratio,
        }
    }

    /// Replace the helper table
    #[must_use]
    pub fn with_helpers(mut self, helpers: HelperRegistry) -> Self {
        self.helpers = helpers;
        self
    }

    #[must_use]
    pub const fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    #[must_use]
    pub const fn min_size_ratio(&self) -> f64 {
        self.min_size_ratio
    }

    /// Merge `entry` into `template`.
    ///
    /// `raw_text` is the text captured at upload time and `variables` the
    /// template's stored variable set; both feed the merge-time variable set
    /// together with names found in the document itself.
    ///
    /// # Errors
    ///
    /// `FormatError` when `template` is not a ZIP container, `IoError` when
    /// the working copy cannot be written. Everything else degrades.
    pub fn merge(
        &self,
        template: &[u8],
        raw_text: &str,
        variables: &[Variable],
        entry: &Entry,
    ) -> Result<MergeOutcome> {
        container::ensure_container(template)?;
        let copy = WorkingCopy::create(template)?;
        let working = copy.template_bytes()?;
        Self::enter(MergeState::Loaded);

        let merge_set = match self.merge_set(&working, raw_text, variables) {
            Ok(set) => set,
            Err(e) => {
                let names = variables.iter().map(|v| v.name.clone()).collect();
                return Ok(Self::degrade(template, names, &e.to_string()));
            }
        };
        let names: Vec<String> = merge_set.iter().map(|v| v.name.clone()).collect();
        Self::enter(MergeState::Validated);

        let resolved: HashMap<&str, Fragment> = merge_set
            .iter()
            .map(|v| {
                let fragment = self.helpers.render(entry.value(&v.name), v.format.as_ref());
                (v.name.as_str(), fragment)
            })
            .collect();

        let mut substitutions = 0;
        let rewritten = container::rewrite_text_parts(&working, |part, xml| {
            let (xml, count) = Self::rewrite_part(part, xml, &resolved)?;
            substitutions += count;
            Ok(xml)
        });
        let merged = match rewritten {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Self::degrade(template, names, &e.to_string())),
        };
        Self::enter(MergeState::Substituted);

        let output = copy.store_output(&merged)?;
        match self.verify(template, &output, &names) {
            Ok(()) => {
                Self::enter(MergeState::Verified);
                Self::enter(MergeState::Accepted);
                info!(
                    "Merged entry {} ({substitutions} substitutions, {} bytes)",
                    entry.id,
                    output.len()
                );
                Ok(MergeOutcome {
                    bytes: output,
                    degraded: false,
                    unresolved: Vec::new(),
                    reason: None,
                    substitutions,
                })
            }
            Err(DocmergeError::MergeVerificationFailure { unresolved, reason }) => {
                Ok(Self::degrade(template, unresolved, &reason))
            }
            Err(e) => Ok(Self::degrade(template, names, &e.to_string())),
        }
    }

    fn enter(state: MergeState) {
        debug!("Merge state: {state}");
    }

    fn degrade(template: &[u8], unresolved: Vec<String>, reason: &str) -> MergeOutcome {
        Self::enter(MergeState::Degraded);
        warn!(
            "Merge degraded, returning original template: {reason} (unresolved: [{}])",
            unresolved.join(", ")
        );
        MergeOutcome {
            bytes: template.to_vec(),
            degraded: true,
            unresolved,
            reason: Some(reason.to_string()),
            substitutions: 0,
        }
    }

    /// unify(stored variables, names in live text, names in upload-time text)
    fn merge_set(
        &self,
        working: &[u8],
        raw_text: &str,
        variables: &[Variable],
    ) -> Result<Vec<Variable>> {
        let live = self.extractor.extract_live_text(working)?;
        let live_scan = placeholder::scan(&live);
        let raw_scan = placeholder::scan(raw_text);
        for token in live_scan.invalid.iter().chain(&raw_scan.invalid) {
            warn!("Skipping invalid placeholder token {token:?}");
        }

        let mut set = unify([variables]);
        let detected = |name: &str| Variable::detected(name, VariableSource::DetectedFromText);
        extend_with_names(&mut set, &live_scan.names, detected);
        extend_with_names(&mut set, &raw_scan.names, detected);
        debug!("Merge set: {} variable(s)", set.len());
        Ok(set)
    }

    /// Rewrite one part; `None` keeps the part byte-identical.
    fn rewrite_part(
        part: &str,
        xml: &str,
        resolved: &HashMap<&str, Fragment>,
    ) -> Result<(Option<String>, usize)> {
        if !xml.contains('{') {
            return Ok((None, 0));
        }
        let mut events = parse_events(xml)
            .map_err(|e| DocmergeError::XmlError(format!("{part}: {e}")))?;
        let count = runs::rewrite_part(&mut events, |name| resolved.get(name).cloned())?;
        if count == 0 {
            return Ok((None, 0));
        }
        debug!("{part}: {count} substitution(s)");
        Ok((Some(write_events(&events)?), count))
    }

    /// Post-substitution checks.
    fn verify(&self, input: &[u8], output: &[u8], names: &[String]) -> Result<()> {
        let failure = |unresolved: Vec<String>, reason: String| {
            Err(DocmergeError::MergeVerificationFailure { unresolved, reason })
        };

        if !container::has_container_signature(output) {
            return failure(names.to_vec(), "output lost the container signature".into());
        }

        let live = self.extractor.extract_live_text(output)?;
        if live.contains(OPEN_DELIMITER) {
            let remaining = placeholder::scan(&live).names;
            let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
            let unresolved: Vec<String> = remaining
                .iter()
                .filter(|name| wanted.contains(name.as_str()))
                .cloned()
                .collect();
            if !unresolved.is_empty() {
                return failure(unresolved, "placeholders remain after substitution".into());
            }

            // any other placeholder must already have been in the template
            let original = self.extractor.extract_live_text(input)?;
            let known: HashSet<String> = placeholder::scan(&original).names.into_iter().collect();
            let introduced: Vec<String> = remaining
                .into_iter()
                .filter(|name| !known.contains(name))
                .collect();
            if !introduced.is_empty() {
                return failure(
                    introduced,
                    "substitution produced placeholders the template does not have".into(),
                );
            }
        }

        #[allow(clippy::cast_precision_loss)] // document sizes are far below 2^52
        let minimum = self.min_size_ratio * input.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let actual = output.len() as f64;
        if actual < minimum {
            return failure(
                Vec::new(),
                format!(
                    "output is {} bytes, below {:.0}% of the {}-byte template",
                    output.len(),
                    self.min_size_ratio * 100.0,
                    input.len()
                ),
            );
        }

        Ok(())
    }
}

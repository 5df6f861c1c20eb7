//! Merge variable lists coming from several extraction passes.

use crate::types::Variable;
use std::collections::HashSet;

/// Concatenate `lists` in priority order and keep the first variable seen
/// for each canonical name.
///
/// Matching is exact and case-sensitive. Because earlier lists win, the
/// primary source decides label, type and helper binding on conflicts.
#[must_use = "unified variable list is returned but not used"]
pub fn unify<'a, I>(lists: I) -> Vec<Variable>
where
    I: IntoIterator<Item = &'a [Variable]>,
{
    let mut seen = HashSet::new();
    let mut unified = Vec::new();

    for list in lists {
        for variable in list {
            if seen.insert(variable.name.as_str()) {
                unified.push(variable.clone());
            }
        }
    }

    unified
}

/// Append names not already present as new variables built by `make`.
///
/// Used when one side of a unification is a plain name list (e.g. names
/// re-extracted from a document at merge time).
pub fn extend_with_names<F>(variables: &mut Vec<Variable>, names: &[String], mut make: F)
where
    F: FnMut(&str) -> Variable,
{
    let mut seen: HashSet<String> = variables.iter().map(|v| v.name.clone()).collect();
    for name in names {
        if seen.insert(name.clone()) {
            variables.push(make(name));
        }
    }
}

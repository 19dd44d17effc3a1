//! RG-003: Interpolation reference extraction and argument resolution.
//!
//! Text arguments may contain `${name}` or `${name1+name2+...}` markers.
//! Extraction returns the union of all names in declaration order without
//! duplicates. Resolution substitutes values from the run's store.

use super::error::InterpolationError;
use super::types::{Store, TaskArg, Value};
use indexmap::IndexSet;
use regex::Regex;
use std::sync::OnceLock;

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("static marker regex"))
}

fn marker_names(inner: &str) -> impl Iterator<Item = &str> {
    inner.split('+').map(str::trim).filter(|n| !n.is_empty())
}

/// Extract the de-duplicated, order-preserving list of referenced names.
pub fn extract_refs(text: &str) -> Vec<String> {
    let mut names: IndexSet<String> = IndexSet::new();
    for cap in marker_regex().captures_iter(text) {
        for name in marker_names(&cap[1]) {
            names.insert(name.to_string());
        }
    }
    names.into_iter().collect()
}

/// Resolve all interpolation markers in an argument against the store.
///
/// A text value that is exactly one single-name marker takes the referenced
/// value as-is, keeping its type. Otherwise each marker is replaced by the
/// concatenated text forms of its names.
pub fn interpolate(arg: &TaskArg, store: &Store) -> Result<TaskArg, InterpolationError> {
    let text = match &arg.value {
        Value::Text(s) => s,
        _ => return Ok(arg.clone()),
    };

    let lookup = |name: &str| {
        store
            .get(name)
            .map(|r| &r.value)
            .ok_or_else(|| InterpolationError::UnknownReference(name.to_string()))
    };

    if let Some(cap) = marker_regex().captures(text) {
        let whole = cap.get(0).map(|m| m.as_str()).unwrap_or_default();
        let names: Vec<&str> = marker_names(&cap[1]).collect();
        if whole == text && names.len() == 1 {
            return Ok(TaskArg::new(lookup(names[0])?.clone()));
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for cap in marker_regex().captures_iter(text) {
        let Some(m) = cap.get(0) else { continue };
        result.push_str(&text[last..m.start()]);
        for name in marker_names(&cap[1]) {
            result.push_str(&lookup(name)?.to_string());
        }
        last = m.end();
    }
    result.push_str(&text[last..]);

    Ok(TaskArg::new(result))
}

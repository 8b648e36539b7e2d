//! Column resolver: maps raw export column names onto canonical names and
//! reports which expected columns a table provides.

use std::collections::BTreeSet;

use modelwatch_core::constants::{
    DEFAULT_COLUMNS, INTERNAL_PREFIXES, KNOWN_EXTRA_COLUMNS, NAME,
};
use modelwatch_core::types::FxHashMap;
use polars::prelude::{col, Expr, Schema};

/// Canonical spelling of a raw export column name.
///
/// Comparison ignores case and a leading `px`/`py`/`pz` prefix. Any spelling
/// of "model name" maps to `Name`. Unknown names get an upper-case first letter.
pub fn canonicalize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = strip_internal_prefix(trimmed);
    let lowered = stripped.to_ascii_lowercase();

    if lowered == "modelname" {
        return NAME.to_string();
    }
    if let Some(known) = DEFAULT_COLUMNS
        .iter()
        .chain(KNOWN_EXTRA_COLUMNS)
        .find(|known| known.eq_ignore_ascii_case(stripped))
    {
        return (*known).to_string();
    }

    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => trimmed.to_string(),
    }
}

fn strip_internal_prefix(name: &str) -> &str {
    let lowered = name.to_ascii_lowercase();
    for prefix in INTERNAL_PREFIXES {
        let n = prefix.len();
        if lowered.starts_with(prefix) && name.len() > n && name.is_char_boundary(n) {
            return &name[n..];
        }
    }
    name
}

/// Canonical columns expected for a table: the defaults plus `include`, minus
/// `exclude`. Caller-supplied names are canonicalized first.
pub fn expected_columns<S: AsRef<str>>(include: &[S], exclude: &[S]) -> BTreeSet<String> {
    let excluded: BTreeSet<String> = exclude
        .iter()
        .map(|c| canonicalize_name(c.as_ref()))
        .collect();
    DEFAULT_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(include.iter().map(|c| canonicalize_name(c.as_ref())))
        .filter(|c| !excluded.contains(c))
        .collect()
}

/// Outcome of resolving one table's columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// `(raw, canonical)` for every raw column kept, in table order.
    pub mapping: Vec<(String, String)>,
    /// Expected columns the table provides.
    pub resolved: BTreeSet<String>,
    /// Expected columns the table lacks.
    pub missing: BTreeSet<String>,
    /// Raw columns dropped because an earlier column had the same canonical name.
    pub duplicates: Vec<(String, String)>,
}

impl Resolution {
    /// Projection renaming raw columns to canonical names. With `subset`, only
    /// resolved columns are kept; otherwise every non-duplicate column is.
    pub fn projection(&self, subset: bool) -> Vec<Expr> {
        self.mapping
            .iter()
            .filter(|(_, canonical)| !subset || self.resolved.contains(canonical))
            .map(|(raw, canonical)| {
                if raw == canonical {
                    col(raw.as_str())
                } else {
                    col(raw.as_str()).alias(canonical.as_str())
                }
            })
            .collect()
    }

    /// True when projecting would not rename or drop anything.
    pub fn is_identity(&self, subset: bool, width: usize) -> bool {
        self.duplicates.is_empty()
            && self.mapping.len() == width
            && self.mapping.iter().all(|(raw, canonical)| raw == canonical)
            && (!subset || self.mapping.iter().all(|(_, c)| self.resolved.contains(c)))
    }
}

/// Resolve `schema` against the expected columns.
///
/// `resolved` and `missing` are disjoint and together equal
/// [`expected_columns`]`(include, exclude)`. Missing columns are not an error.
pub fn resolve<S: AsRef<str>>(schema: &Schema, include: &[S], exclude: &[S]) -> Resolution {
    let expected = expected_columns(include, exclude);

    let mut seen: FxHashMap<String, String> = FxHashMap::default();
    let mut mapping = Vec::with_capacity(schema.len());
    let mut duplicates = Vec::new();
    for raw in schema.iter_names() {
        let raw = raw.as_str();
        let canonical = canonicalize_name(raw);
        if seen.contains_key(&canonical) {
            duplicates.push((raw.to_string(), canonical));
            continue;
        }
        seen.insert(canonical.clone(), raw.to_string());
        mapping.push((raw.to_string(), canonical));
    }

    let (resolved, missing): (BTreeSet<String>, BTreeSet<String>) = expected
        .into_iter()
        .partition(|name| seen.contains_key(name));

    Resolution {
        mapping,
        resolved,
        missing,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{DataType, Field};

    fn schema(fields: &[(&str, DataType)]) -> Schema {
        fields
            .iter()
            .map(|(name, dtype)| Field::new((*name).into(), dtype.clone()))
            .collect()
    }

    #[test]
    fn strips_internal_prefixes_and_case() {
        assert_eq!(canonicalize_name("pyModelID"), "ModelID");
        assert_eq!(canonicalize_name("pxObjClass"), "ObjClass");
        assert_eq!(canonicalize_name("pySnapShotTime"), "SnapshotTime");
        assert_eq!(canonicalize_name("RESPONSECOUNT"), "ResponseCount");
        assert_eq!(canonicalize_name("Positives"), "Positives");
    }

    #[test]
    fn model_name_synonyms_map_to_name() {
        assert_eq!(canonicalize_name("pyName"), "Name");
        assert_eq!(canonicalize_name("ModelName"), "Name");
        assert_eq!(canonicalize_name("MODELNAME"), "Name");
    }

    #[test]
    fn unknown_names_are_capitalized() {
        assert_eq!(canonicalize_name("customField"), "CustomField");
        assert_eq!(canonicalize_name("pyextra"), "Extra");
        assert_eq!(canonicalize_name("p"), "P");
    }

    #[test]
    fn first_duplicate_wins() {
        let schema = schema(&[
            ("pyModelID", DataType::String),
            ("ModelID", DataType::String),
        ]);
        let resolution = resolve::<&str>(&schema, &[], &[]);
        assert_eq!(resolution.mapping, vec![("pyModelID".to_string(), "ModelID".to_string())]);
        assert_eq!(resolution.duplicates.len(), 1);
    }

    #[test]
    fn projection_respects_subset() {
        let schema = schema(&[
            ("pyModelID", DataType::String),
            ("Whatever", DataType::Int64),
        ]);
        let resolution = resolve::<&str>(&schema, &[], &[]);
        assert_eq!(resolution.projection(true).len(), 1);
        assert_eq!(resolution.projection(false).len(), 2);
        assert!(!resolution.is_identity(true, schema.len()));
    }
}

//! Key extraction: expands the JSON payload some exports embed in the model
//! name into top-level columns.

use modelwatch_core::errors::{DatamartError, DatamartResult};
use modelwatch_core::frame::text_values;
use modelwatch_core::types::FxHashMap;
use modelwatch_core::{EvaluationStrategy, TableFrame};
use polars::prelude::*;
use serde_json::{Map, Value};

use crate::resolver::canonicalize_name;

/// Raw key a plain, non-JSON name is stored under.
const PLAIN_NAME_KEY: &str = "pyName";

/// Expand the structured payload in `column` into one column per key.
///
/// A value that is not a JSON object is kept as `{"pyName": value}`. New
/// columns get canonical names; `column` itself is replaced. When an
/// extracted key collides with another existing column, the existing column
/// is kept. Requires eager evaluation because the output schema depends on
/// the data.
pub fn extract_keys(
    frame: TableFrame,
    column: &str,
    strategy: EvaluationStrategy,
) -> DatamartResult<TableFrame> {
    if !strategy.is_eager() {
        return Err(DatamartError::not_eager("key extraction"));
    }
    let mut df = frame.collect()?;
    if df.get_column_index(column).is_none() {
        tracing::debug!(table = frame.label(), column, "no column to extract keys from");
        return Ok(TableFrame::materialized(frame.label(), df));
    }

    let payloads: Vec<Option<Map<String, Value>>> = text_values(&df, column)?
        .into_iter()
        .map(|value| value.map(|text| payload(&text)))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut canonical_of: FxHashMap<String, String> = FxHashMap::default();
    for map in payloads.iter().flatten() {
        for key in map.keys() {
            if !canonical_of.contains_key(key) {
                canonical_of.insert(key.clone(), canonicalize_name(key));
                order.push(key.clone());
            }
        }
    }

    df = df.drop(column)?;
    for key in &order {
        let name = &canonical_of[key];
        if df.get_column_index(name).is_some() {
            tracing::debug!(table = frame.label(), key = %key, "extracted key shadows a column, skipped");
            continue;
        }
        let values: Vec<Option<&Value>> = payloads
            .iter()
            .map(|map| map.as_ref().and_then(|m| m.get(key)))
            .collect();
        df.with_column(json_series(name, &values))?;
    }

    tracing::debug!(table = frame.label(), keys = order.len(), "extracted keys from {column}");
    Ok(TableFrame::materialized(frame.label(), df))
}

fn payload(text: &str) -> Map<String, Value> {
    if text.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            return map;
        }
    }
    let mut map = Map::new();
    map.insert(PLAIN_NAME_KEY.to_string(), Value::String(text.to_string()));
    map
}

/// One extracted column. Booleans, integers and floats keep their type when
/// every present value agrees; anything else becomes text.
fn json_series(name: &str, values: &[Option<&Value>]) -> Series {
    let name = PlSmallStr::from(name);
    let present = || values.iter().flatten().filter(|v| !v.is_null());

    if present().all(|v| v.is_boolean()) {
        let data: Vec<Option<bool>> = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
        return Series::new(name, data);
    }
    if present().all(|v| v.is_i64()) {
        let data: Vec<Option<i64>> = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
        return Series::new(name, data);
    }
    if present().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
        return Series::new(name, data);
    }
    let data: Vec<Option<String>> = values
        .iter()
        .map(|v| match v {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
        .collect();
    Series::new(name, data)
}

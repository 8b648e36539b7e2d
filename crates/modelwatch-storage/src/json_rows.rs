//! JSON row codec.
//!
//! Exports are JSON lines, one object per line, keys are column names. A
//! single JSON array of objects is accepted too. Column types come from
//! polars' schema inference.

use std::io::{Cursor, Write};

use modelwatch_core::errors::StorageError;
use polars::prelude::*;

/// Timestamp layout written for datetime values. It matches the default
/// export format, so written files ingest like raw exports.
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S%.3f GMT";

/// Decode JSON lines (or a JSON array of objects) into a frame. `path` only
/// labels errors.
pub fn decode(bytes: &[u8], path: &str) -> Result<DataFrame, StorageError> {
    let invalid = |message: String| StorageError::InvalidRecord {
        path: path.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(DataFrame::empty());
    }

    let cursor = Cursor::new(bytes);
    let decoded = if trimmed.starts_with('[') {
        JsonReader::new(cursor)
            .with_json_format(JsonFormat::Json)
            .finish()
    } else {
        JsonLineReader::new(cursor).finish()
    };
    decoded.map_err(|e| invalid(e.to_string()))
}

/// Encode `df` as JSON lines. Datetimes are written in [`DATETIME_FORMAT`] and
/// categoricals as their text.
pub fn encode<W: Write>(df: &DataFrame, writer: W, path: &str) -> Result<(), StorageError> {
    let serialization = |e: PolarsError| StorageError::Serialization {
        path: path.to_string(),
        message: e.to_string(),
    };
    let mut plain = writable(df).map_err(serialization)?;
    JsonWriter::new(writer)
        .with_json_format(JsonFormat::JsonLines)
        .finish(&mut plain)
        .map_err(serialization)
}

fn writable(df: &DataFrame) -> PolarsResult<DataFrame> {
    let conversions: Vec<Expr> = df
        .get_columns()
        .iter()
        .filter_map(|column| {
            let name = column.name().as_str();
            match column.dtype() {
                DataType::Datetime(..) => {
                    Some(col(name).dt().strftime(DATETIME_FORMAT).alias(name))
                }
                DataType::Categorical(..) => Some(col(name).cast(DataType::String)),
                _ => None,
            }
        })
        .collect();
    if conversions.is_empty() {
        return Ok(df.clone());
    }
    df.clone().lazy().with_columns(conversions).collect()
}

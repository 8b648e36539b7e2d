//! Reading materialized values back into Rust.

use polars::prelude::*;

use super::FrameResult;

/// Column values rendered as text. Categoricals resolve through the string cache.
pub fn text_values(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

pub fn i64_values(df: &DataFrame, name: &str) -> FrameResult<Vec<Option<i64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

/// First value of a single-row aggregate.
pub fn scalar_i64(df: &DataFrame, name: &str) -> FrameResult<Option<i64>> {
    Ok(i64_values(df, name)?.into_iter().next().flatten())
}

pub fn scalar_f64(df: &DataFrame, name: &str) -> FrameResult<Option<f64>> {
    Ok(f64_values(df, name)?.into_iter().next().flatten())
}

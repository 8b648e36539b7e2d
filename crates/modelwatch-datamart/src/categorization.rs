//! Predictor categorization: a pluggable rule deriving `PredictorCategory`.

use std::fmt;
use std::sync::Arc;

use modelwatch_core::constants::{
    ENTRY_TYPE, PREDICTOR_CATEGORY, PREDICTOR_NAME, PRIMARY_CATEGORY, TYPE,
};
use modelwatch_core::frame::categorical;
use polars::prelude::*;

/// What a categorization rule sees of one predictor row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorAttributes<'a> {
    pub name: &'a str,
    pub entry_type: Option<&'a str>,
    pub predictor_type: Option<&'a str>,
}

/// Strategy producing a category label from predictor attributes.
///
/// Implementations must be pure; deferred plans may call them at any time and
/// more than once per row.
pub trait PredictorCategorizer: Send + Sync + fmt::Debug {
    fn categorize(&self, attributes: &PredictorAttributes<'_>) -> Option<String>;
}

/// Text before the first `.` of the predictor name, else `"Primary"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPredictorCategorizer;

impl PredictorCategorizer for DefaultPredictorCategorizer {
    fn categorize(&self, attributes: &PredictorAttributes<'_>) -> Option<String> {
        let category = match attributes.name.split_once('.') {
            Some((prefix, _)) if !prefix.is_empty() => prefix,
            _ => PRIMARY_CATEGORY,
        };
        Some(category.to_string())
    }
}

/// Any `Fn(&PredictorAttributes) -> Option<String>` is a categorizer.
pub struct FnCategorizer<F> {
    name: &'static str,
    f: F,
}

impl<F> FnCategorizer<F>
where
    F: Fn(&PredictorAttributes<'_>) -> Option<String> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnCategorizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnCategorizer").field(&self.name).finish()
    }
}

impl<F> PredictorCategorizer for FnCategorizer<F>
where
    F: Fn(&PredictorAttributes<'_>) -> Option<String> + Send + Sync,
{
    fn categorize(&self, attributes: &PredictorAttributes<'_>) -> Option<String> {
        (self.f)(attributes)
    }
}

/// Row-wise adapter running a categorizer over the input columns of a
/// `map_multiple` call: the predictor name, then entry type and predictor
/// type when the table has them.
#[derive(Debug, Clone)]
struct CategorizeUdf {
    categorizer: Arc<dyn PredictorCategorizer>,
    has_entry_type: bool,
    has_type: bool,
}

fn text_input(columns: &[Column], index: usize) -> PolarsResult<&StringChunked> {
    columns
        .get(index)
        .ok_or_else(|| PolarsError::ComputeError("categorize: missing input".into()))?
        .as_materialized_series()
        .str()
}

impl CategorizeUdf {
    fn call(&self, columns: &[Column]) -> PolarsResult<Column> {
        let names = text_input(columns, 0)?;
        let entry_types = if self.has_entry_type {
            Some(text_input(columns, 1)?)
        } else {
            None
        };
        let types = if self.has_type {
            Some(text_input(columns, 1 + usize::from(self.has_entry_type))?)
        } else {
            None
        };

        let categories: StringChunked = (0..names.len())
            .map(|row| {
                let name = names.get(row)?;
                let attributes = PredictorAttributes {
                    name,
                    entry_type: entry_types.and_then(|c| c.get(row)),
                    predictor_type: types.and_then(|c| c.get(row)),
                };
                self.categorizer.categorize(&attributes)
            })
            .collect();
        Ok(categories
            .with_name(PREDICTOR_CATEGORY.into())
            .into_series()
            .into())
    }
}

/// Expression computing `PredictorCategory` for a table with `schema`, or
/// `None` when there is no predictor name to categorize.
pub fn category_expr(categorizer: Arc<dyn PredictorCategorizer>, schema: &Schema) -> Option<Expr> {
    if !schema.contains(PREDICTOR_NAME) {
        return None;
    }
    let udf = CategorizeUdf {
        categorizer,
        has_entry_type: schema.contains(ENTRY_TYPE),
        has_type: schema.contains(TYPE),
    };
    let mut inputs = vec![col(PREDICTOR_NAME).cast(DataType::String)];
    if udf.has_entry_type {
        inputs.push(col(ENTRY_TYPE).cast(DataType::String));
    }
    if udf.has_type {
        inputs.push(col(TYPE).cast(DataType::String));
    }
    let expr = map_multiple(
        move |columns: &mut [Column]| udf.call(columns).map(Some),
        inputs,
        GetOutput::from_type(DataType::String),
    );
    Some(expr.cast(categorical()).alias(PREDICTOR_CATEGORY))
}

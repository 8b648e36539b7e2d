//! Expression glue the polars DSL does not provide as a single call.

use polars::prelude::*;

/// Dtype used for context-key columns. Lexical ordering keeps grouped and
/// sorted output stable regardless of which table interned a value first.
pub fn categorical() -> DataType {
    DataType::Categorical(None, CategoricalOrdering::Lexical)
}

/// Dtype of parsed snapshot timestamps.
pub fn timestamp_type() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// A typed null literal.
pub fn null_of(dtype: DataType) -> Expr {
    lit(NULL).cast(dtype)
}

/// `numerator / denominator` as a float, null where the denominator is zero.
pub fn safe_div(numerator: Expr, denominator: Expr) -> Expr {
    when(denominator.clone().eq(lit(0)))
        .then(null_of(DataType::Float64))
        .otherwise(numerator.cast(DataType::Float64) / denominator.cast(DataType::Float64))
}

/// Aggregation: `sum(value * weight) / sum(weight)`, null when the weights sum
/// to zero.
pub fn weighted_mean(value: Expr, weight: Expr) -> Expr {
    let value = value.cast(DataType::Float64);
    let weight = weight.cast(DataType::Float64);
    let total = weight.clone().sum();
    when(total.clone().eq(lit(0.0)))
        .then(null_of(DataType::Float64))
        .otherwise((value * weight).sum() / total)
}

/// Latest `order` value at which `value` differs from the previous row of the
/// same `partition`, walking each partition in `order`. Broadcast to every row
/// of the partition; null when the value never changes.
pub fn last_change(value: &str, order: &str, partition: &str) -> Expr {
    let by_time = SortMultipleOptions::default();
    let sorted = col(value).sort_by([col(order)], by_time.clone());
    let changed = sorted.clone().neq(sorted.shift(lit(1)));
    col(order)
        .sort_by([col(order)], by_time)
        .filter(changed)
        .max()
        .over([col(partition)])
}

/// Distinct column names an expression reads, sorted.
pub fn referenced_columns(expr: &Expr) -> Vec<String> {
    let mut names: Vec<String> = expr
        .into_iter()
        .filter_map(|node| match node {
            Expr::Column(name) => Some(name.to_string()),
            _ => None,
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

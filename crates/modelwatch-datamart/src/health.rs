//! Model health statistics.

use std::fmt::Write as _;

use modelwatch_core::constants::{
    BASELINE_PERFORMANCE, MATURITY_POSITIVES, PERFORMANCE, POSITIVES, RESPONSE_COUNT,
    SNAPSHOT_TIME, SUCCESS_RATE,
};
use modelwatch_core::errors::{DatamartError, DatamartResult};
use modelwatch_core::frame::scalar_i64;
use modelwatch_core::TableFrame;
use polars::prelude::*;
use serde::Serialize;

use crate::aggregates::latest_snapshot;

/// Bucket sizes of a model health check.
///
/// Buckets overlap: a model can be both empty and immature, so
/// `non_performing` may exceed the number of distinct unhealthy models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelHealthStats {
    /// Distinct snapshot times; a null time counts as one value.
    pub snapshots: usize,
    pub total: usize,
    /// No responses at all.
    pub empty: usize,
    /// Responses but no positives.
    pub no_positives: usize,
    /// Between 0 and 200 positives.
    pub immature: usize,
    /// At least 200 positives yet baseline performance.
    pub no_performance: usize,
    /// Sum of the four buckets above.
    pub non_performing: usize,
    /// Rows with a null value, per context key present in the table.
    pub missing_by_key: Vec<(String, usize)>,
    /// Baseline performance and a zero success rate.
    pub bottom_left: usize,
}

fn baseline() -> Expr {
    col(PERFORMANCE).eq(lit(BASELINE_PERFORMANCE))
}

fn bucket(name: &str, predicate: Expr) -> Expr {
    predicate.sum().cast(DataType::Int64).alias(name)
}

/// Classify the models of `model` into health buckets.
pub fn model_health_stats<S: AsRef<str>>(
    model: TableFrame,
    context_keys: &[S],
    only_latest: bool,
) -> DatamartResult<ModelHealthStats> {
    let required = [RESPONSE_COUNT, POSITIVES, PERFORMANCE, SUCCESS_RATE, SNAPSHOT_TIME];
    let missing = model.missing_columns(&required)?;
    if !missing.is_empty() {
        return Err(DatamartError::MissingColumns {
            table: model.label().to_string(),
            columns: missing,
        });
    }
    let schema = model.schema()?;
    let keys: Vec<&str> = context_keys
        .iter()
        .map(AsRef::as_ref)
        .filter(|k| schema.contains(k))
        .collect();

    let frame = if only_latest { latest_snapshot(model) } else { model };

    let mut aggs = vec![
        len().cast(DataType::Int64).alias("total"),
        // n_unique counts null as one more value.
        col(SNAPSHOT_TIME).n_unique().cast(DataType::Int64).alias("snapshots"),
        bucket("empty", col(RESPONSE_COUNT).eq(lit(0))),
        bucket(
            "no_positives",
            col(RESPONSE_COUNT).gt(lit(0)).and(col(POSITIVES).eq(lit(0))),
        ),
        bucket(
            "immature",
            col(POSITIVES)
                .gt_eq(lit(0))
                .and(col(POSITIVES).lt_eq(lit(MATURITY_POSITIVES))),
        ),
        bucket(
            "no_performance",
            col(POSITIVES).gt_eq(lit(MATURITY_POSITIVES)).and(baseline()),
        ),
        bucket("bottom_left", baseline().and(col(SUCCESS_RATE).eq(lit(0.0)))),
    ];
    for key in &keys {
        aggs.push(bucket(&format!("missing_{key}"), col(*key).is_null()));
    }

    let stats = frame.lazy().select(aggs).collect()?;
    let count = |name: &str| -> DatamartResult<usize> {
        Ok(scalar_i64(&stats, name)?.unwrap_or(0).max(0) as usize)
    };

    let empty = count("empty")?;
    let no_positives = count("no_positives")?;
    let immature = count("immature")?;
    let no_performance = count("no_performance")?;
    let missing_by_key = keys
        .iter()
        .map(|key| Ok((key.to_string(), count(&format!("missing_{key}"))?)))
        .collect::<DatamartResult<Vec<_>>>()?;

    Ok(ModelHealthStats {
        snapshots: count("snapshots")?,
        total: count("total")?,
        empty,
        no_positives,
        immature,
        no_performance,
        non_performing: empty + no_positives + immature + no_performance,
        missing_by_key,
        bottom_left: count("bottom_left")?,
    })
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl ModelHealthStats {
    /// Plain-text report. With `show_all_missing`, context keys without
    /// missing values are listed too.
    pub fn describe(&self, show_all_missing: bool) -> String {
        let n = self.total;
        let mut out = String::new();
        let _ = writeln!(out, "From all {n} models:");
        let lines = [
            (self.empty, "models have never received a response."),
            (
                self.no_positives,
                "models have been used but never received a 'positive' response.",
            ),
            (
                self.immature,
                "models are still in an 'immature' phase of learning (Positives between 0 and 200).",
            ),
            (
                self.no_performance,
                "models have received over 200 positives but still show minimum performance.",
            ),
        ];
        for (count, text) in lines {
            let _ = writeln!(out, "{count} ({:.2}%) {text}", percent(count, n));
        }
        let _ = writeln!(
            out,
            "Meaning in total, {} ({:.0}%) models do not perform as well as they could be.",
            self.non_performing,
            percent(self.non_performing, n)
        );
        out.push('\n');

        for (key, count) in &self.missing_by_key {
            if *count > 0 || show_all_missing {
                let pct = percent(*count, n);
                let _ = writeln!(out, "{count} ({pct:.2}%) models missing {key} attribute.");
            }
        }
        let _ = writeln!(
            out,
            "{} ({:.2}%) models at baseline performance with a zero success rate.",
            self.bottom_left,
            percent(self.bottom_left, n)
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> ModelHealthStats {
        ModelHealthStats {
            snapshots: 1,
            total: 4,
            empty: 1,
            no_positives: 0,
            immature: 2,
            no_performance: 0,
            non_performing: 3,
            missing_by_key: vec![("Channel".to_string(), 0), ("Issue".to_string(), 1)],
            bottom_left: 1,
        }
    }

    #[test]
    fn describe_reports_percentages() {
        let text = stats().describe(true);
        assert!(text.starts_with("From all 4 models:\n"));
        assert!(text.contains("1 (25.00%) models have never received a response."));
        assert!(text.contains("Meaning in total, 3 (75%)"));
        assert!(text.contains("0 (0.00%) models missing Channel attribute."));
    }

    #[test]
    fn describe_can_hide_complete_keys() {
        let text = stats().describe(false);
        assert!(!text.contains("missing Channel"));
        assert!(text.contains("1 (25.00%) models missing Issue attribute."));
    }

    #[test]
    fn empty_table_has_zero_percentages() {
        assert_eq!(percent(0, 0), 0.0);
    }
}

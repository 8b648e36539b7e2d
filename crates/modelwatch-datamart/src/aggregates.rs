//! Combiner and aggregator: latest snapshots, the combined view, summaries,
//! predictor counts, channel and response views, and the predictor
//! performance pivot.

use modelwatch_core::constants::{
    BASELINE_PERFORMANCE, CHANNEL, CLASSIFIER_PREDICTOR, COMBINED_SUFFIX, DIRECTION, ENTRY_TYPE,
    GROUP, ISSUE, MODEL_ID, NAME, PERFORMANCE, PIVOT_FILL_PERFORMANCE, POSITIVES,
    PREDICTOR_NAME, RESPONSE_COUNT, SNAPSHOT_TIME, SUCCESS_RATE,
};
use modelwatch_core::errors::{DatamartError, DatamartResult};
use modelwatch_core::frame::{f64_values, safe_div, text_values, timestamp_type, weighted_mean};
use modelwatch_core::types::{FxHashMap, FxHashSet, KeyVec};
use modelwatch_core::{EvaluationStrategy, TableFrame};
use polars::prelude::*;

use crate::query::{apply_query, Query};

pub const COUNT: &str = "count";
pub const COUNT_WITHOUT_RESPONSES: &str = "Count_without_responses";
pub const PERCENTAGE_WITHOUT_RESPONSES: &str = "Percentage_without_responses";
pub const PERFORMANCE_WEIGHTED: &str = "Performance_weighted";
pub const SUCCESS_RATE_WEIGHTED: &str = "SuccessRate_weighted";
pub const PREDICTOR_COUNT: &str = "PredictorCount";
pub const OVERALL: &str = "Overall";

pub const PERIOD: &str = "Period";
pub const DATE_RANGE_MIN: &str = "DateRange Min";
pub const DATE_RANGE_MAX: &str = "DateRange Max";
pub const TOTAL_ACTIONS: &str = "Total Number of Actions";
pub const USED_ACTIONS: &str = "Used Actions";
pub const CHANNEL_DIRECTION: &str = "ChannelDirection";
pub const IS_VALID: &str = "isValid";
pub const CTR: &str = "CTR";

pub const TOTAL_RESPONSE_FRACTION: &str = "TotalResponseFraction";
pub const TOTAL_MODELS_FRACTION: &str = "TotalModelsFraction";

pub const POSITIVES_BIN: &str = "PositivesBin";
pub const MODEL_COUNT: &str = "ModelCount";
pub const CUM_MODELS: &str = "cumModels";

/// Metrics reported with `_max` and `_mean` by [`summarize`].
const SUMMARY_METRICS: &[&str] = &[RESPONSE_COUNT, PERFORMANCE, SUCCESS_RATE, POSITIVES];

/// Channel summaries below these totals are flagged as not yet valid.
const VALID_CHANNEL_POSITIVES: i64 = 200;
const VALID_CHANNEL_RESPONSES: i64 = 1000;

/// Upper edge and width of the [`models_by_positives`] bins.
const POSITIVES_BIN_MAX: i64 = 200;
const POSITIVES_BIN_WIDTH: usize = 10;

/// Rows at the most recent snapshot.
///
/// A null snapshot time counts as the Unix epoch, so a table without any
/// snapshot times keeps all of its rows. Idempotent.
pub fn latest_snapshot(frame: TableFrame) -> TableFrame {
    let time = col(SNAPSHOT_TIME).fill_null(lit(0).cast(timestamp_type()));
    frame.map(|lf| lf.filter(time.clone().eq(time.max())))
}

/// Inner join of the two tables on `ModelID`. Predictor columns whose name
/// is taken on the model side get the `Bin` suffix.
pub fn combine(model: TableFrame, predictor: TableFrame, only_latest: bool) -> TableFrame {
    let (model, predictor) = if only_latest {
        (latest_snapshot(model), latest_snapshot(predictor))
    } else {
        (model, predictor)
    };
    let right = predictor.lazy();
    model
        .map(|lf| {
            lf.join(
                right,
                [col(MODEL_ID)],
                [col(MODEL_ID)],
                JoinArgs::new(JoinType::Inner).with_suffix(Some(COMBINED_SUFFIX.into())),
            )
        })
        .with_label("combined data")
}

fn require(frame: &TableFrame, columns: &[&str]) -> DatamartResult<()> {
    let missing = frame.missing_columns(columns)?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatamartError::MissingColumns {
            table: frame.label().to_string(),
            columns: missing,
        })
    }
}

fn filtered(
    frame: TableFrame,
    query: Option<&Query>,
    strategy: EvaluationStrategy,
) -> DatamartResult<TableFrame> {
    match query {
        Some(query) => Ok(apply_query(frame, query, strategy)?),
        None => Ok(frame),
    }
}

fn key_exprs<S: AsRef<str>>(keys: &[S]) -> KeyVec<Expr> {
    keys.iter().map(|k| col(k.as_ref())).collect()
}

/// Aggregations computed per group by [`summarize`].
pub fn summary_aggregations() -> Vec<Expr> {
    let mut aggs = vec![
        len().cast(DataType::Int64).alias(COUNT),
        col(RESPONSE_COUNT)
            .eq(lit(0))
            .sum()
            .cast(DataType::Int64)
            .alias(COUNT_WITHOUT_RESPONSES),
        col(RESPONSE_COUNT).sum().alias(format!("{RESPONSE_COUNT}_sum")),
        col(POSITIVES).sum().alias(format!("{POSITIVES}_sum")),
    ];
    for metric in SUMMARY_METRICS {
        aggs.push(col(*metric).max().alias(format!("{metric}_max")));
        aggs.push(col(*metric).mean().alias(format!("{metric}_mean")));
    }
    aggs.push(weighted_mean(col(PERFORMANCE), col(RESPONSE_COUNT)).alias(PERFORMANCE_WEIGHTED));
    aggs.push(weighted_mean(col(SUCCESS_RATE), col(RESPONSE_COUNT)).alias(SUCCESS_RATE_WEIGHTED));
    aggs
}

/// Per-group statistics over the latest snapshot of the model table.
///
/// Groups come out sorted by `group_keys`; with no keys there is one row.
pub fn summarize<S: AsRef<str>>(
    model: TableFrame,
    group_keys: &[S],
    query: Option<&Query>,
    strategy: EvaluationStrategy,
) -> DatamartResult<TableFrame> {
    let mut required: Vec<&str> = group_keys.iter().map(AsRef::as_ref).collect();
    required.extend([RESPONSE_COUNT, POSITIVES, PERFORMANCE, SUCCESS_RATE, SNAPSHOT_TIME]);
    require(&model, &required)?;

    let frame = latest_snapshot(filtered(model, query, strategy)?);
    let percentage = safe_div(col(COUNT_WITHOUT_RESPONSES), col(COUNT))
        .fill_null(lit(0.0))
        .alias(PERCENTAGE_WITHOUT_RESPONSES);
    let keys = key_exprs(group_keys);
    let summary = frame.map(|lf| {
        if keys.is_empty() {
            lf.select(summary_aggregations()).with_column(percentage)
        } else {
            lf.group_by(keys.clone())
                .agg(summary_aggregations())
                .with_column(percentage)
                .sort_by_exprs(keys, SortMultipleOptions::default())
        }
    });
    Ok(summary.with_label("model summary"))
}

/// Distinct predictors per `(Name, EntryType, by)` plus an `Overall` row per
/// `(Name, EntryType)`, over a combined view. The classifier is not counted.
pub fn predictor_counts(
    combined: TableFrame,
    by: &str,
    query: Option<&Query>,
    strategy: EvaluationStrategy,
) -> DatamartResult<TableFrame> {
    require(&combined, &[NAME, ENTRY_TYPE, PREDICTOR_NAME, by])?;

    let per_group = filtered(combined, query, strategy)?
        .lazy()
        .filter(col(PREDICTOR_NAME).cast(DataType::String).neq(lit(CLASSIFIER_PREDICTOR)))
        .group_by([col(NAME), col(ENTRY_TYPE), col(by)])
        .agg([col(PREDICTOR_NAME).n_unique().cast(DataType::Int64).alias(PREDICTOR_COUNT)])
        .select([
            col(NAME).cast(DataType::String),
            col(ENTRY_TYPE).cast(DataType::String),
            col(by).cast(DataType::String),
            col(PREDICTOR_COUNT),
        ]);
    let overall = per_group
        .clone()
        .group_by([col(NAME), col(ENTRY_TYPE)])
        .agg([col(PREDICTOR_COUNT).sum()])
        .select([col(NAME), col(ENTRY_TYPE), lit(OVERALL).alias(by), col(PREDICTOR_COUNT)]);

    let counts = concat([per_group, overall], UnionArgs::default())?
        .with_column(col(PREDICTOR_COUNT).cast(DataType::Int64))
        .sort_by_exprs(
            [col(NAME), col(ENTRY_TYPE), col(by)],
            SortMultipleOptions::default(),
        );
    Ok(TableFrame::deferred("predictor counts", counts))
}

/// Models per channel and direction, optionally per period of `by_period`
/// (a truncation interval such as `1d`, `1w` or `1mo`).
///
/// Reports the date range, summed counts, response-weighted performance in
/// percent, the number of distinct actions and of actions that received a
/// response, and the click-through rate.
pub fn summary_by_channel(
    model: TableFrame,
    by_period: Option<&str>,
) -> DatamartResult<TableFrame> {
    require(
        &model,
        &[CHANNEL, DIRECTION, POSITIVES, RESPONSE_COUNT, PERFORMANCE, SNAPSHOT_TIME, NAME],
    )?;
    let schema = model.schema()?;
    let action_columns: KeyVec<&str> = [ISSUE, GROUP, NAME]
        .into_iter()
        .filter(|c| schema.contains(c))
        .collect();
    let action_id = concat_str(
        action_columns
            .iter()
            .map(|c| col(*c).cast(DataType::String))
            .collect::<Vec<_>>(),
        "/",
        true,
    );
    let used_action = col(RESPONSE_COUNT)
        .sum()
        .gt(lit(0))
        .over(key_exprs(action_columns.as_slice()))
        .alias("isUsedAction");

    let mut keys: KeyVec<Expr> = KeyVec::from_iter([col(CHANNEL), col(DIRECTION)]);
    let mut derived = vec![used_action];
    if let Some(period) = by_period {
        derived.push(
            col(SNAPSHOT_TIME)
                .dt()
                .truncate(lit(period))
                .cast(DataType::Date)
                .alias(PERIOD),
        );
        keys.push(col(PERIOD));
    }

    let summary = model.map(|lf| {
        lf.with_columns(derived)
            .group_by(keys.clone())
            .agg([
                col(SNAPSHOT_TIME).min().cast(DataType::Date).alias(DATE_RANGE_MIN),
                col(SNAPSHOT_TIME).max().cast(DataType::Date).alias(DATE_RANGE_MAX),
                col(POSITIVES).sum(),
                col(RESPONSE_COUNT).sum(),
                (weighted_mean(col(PERFORMANCE), col(RESPONSE_COUNT)) * lit(100.0))
                    .alias(PERFORMANCE),
                action_id
                    .clone()
                    .n_unique()
                    .cast(DataType::Int64)
                    .alias(TOTAL_ACTIONS),
                action_id
                    .filter(col("isUsedAction"))
                    .n_unique()
                    .cast(DataType::Int64)
                    .alias(USED_ACTIONS),
            ])
            .with_columns([
                concat_str(
                    [
                        col(CHANNEL).cast(DataType::String).fill_null(lit("")),
                        col(DIRECTION).cast(DataType::String).fill_null(lit("")),
                    ],
                    "/",
                    false,
                )
                .alias(CHANNEL_DIRECTION),
                col(POSITIVES)
                    .gt(lit(VALID_CHANNEL_POSITIVES))
                    .and(col(RESPONSE_COUNT).gt(lit(VALID_CHANNEL_RESPONSES)))
                    .alias(IS_VALID),
                safe_div(col(POSITIVES), col(RESPONSE_COUNT)).alias(CTR),
            ])
            .sort_by_exprs(keys, SortMultipleOptions::default())
    });
    Ok(summary.with_label("channel summary"))
}

/// Cumulative response gain per `by` group: models ordered by their largest
/// response count, with the running share of responses and of models.
pub fn response_gain(frame: TableFrame, by: &str) -> DatamartResult<TableFrame> {
    require(&frame, &[by, MODEL_ID, RESPONSE_COUNT])?;
    let gain = frame.map(|lf| {
        lf.group_by([col(by), col(MODEL_ID)])
            .agg([col(RESPONSE_COUNT).max()])
            .sort_by_exprs(
                [col(by), col(RESPONSE_COUNT)],
                SortMultipleOptions::default().with_order_descending(true),
            )
            .with_columns([
                (col(RESPONSE_COUNT).cum_sum(false).cast(DataType::Float64)
                    / col(RESPONSE_COUNT).sum().cast(DataType::Float64))
                .over([col(by)])
                .alias(TOTAL_RESPONSE_FRACTION),
                (col(MODEL_ID).cum_count(false).cast(DataType::Float64)
                    / col(MODEL_ID).count().cast(DataType::Float64))
                .over([col(by)])
                .alias(TOTAL_MODELS_FRACTION),
            ])
    });
    Ok(gain.with_label("response gain"))
}

/// Label of the right-closed positives bin of width 10 up to 200.
fn positives_bin() -> Expr {
    let mut label = lit(format!("({POSITIVES_BIN_MAX}, inf]"));
    for upper in (0..=POSITIVES_BIN_MAX).rev().step_by(POSITIVES_BIN_WIDTH) {
        let text = if upper == 0 {
            "(-inf, 0]".to_string()
        } else {
            format!("({}, {upper}]", upper - POSITIVES_BIN_WIDTH as i64)
        };
        label = when(col(POSITIVES).lt_eq(lit(upper)))
            .then(lit(text))
            .otherwise(label);
    }
    label
}

/// Distinct models per positives bin and `by` group, with the cumulative
/// share of the group's models up to each bin.
pub fn models_by_positives(frame: TableFrame, by: &str) -> DatamartResult<TableFrame> {
    require(&frame, &[by, POSITIVES, MODEL_ID])?;
    let bins = frame.map(|lf| {
        lf.select([col(by), col(POSITIVES), col(MODEL_ID)])
            .filter(col(POSITIVES).is_not_null())
            .with_column(positives_bin().alias(POSITIVES_BIN))
            .group_by([col(by), col(POSITIVES_BIN)])
            .agg([
                col(POSITIVES).min(),
                col(MODEL_ID).n_unique().cast(DataType::Int64).alias(MODEL_COUNT),
            ])
            .sort_by_exprs([col(by), col(POSITIVES)], SortMultipleOptions::default())
            .with_column(
                (col(MODEL_COUNT).cum_sum(false).cast(DataType::Float64)
                    / col(MODEL_COUNT).sum().cast(DataType::Float64))
                .over([col(by)])
                .alias(CUM_MODELS),
            )
    });
    Ok(bins.with_label("models by positives"))
}

/// Rows of the `n` best predictors of a combined view, ranked by the
/// `ResponseCountBin`-weighted mean of `metric` (default `PerformanceBin`).
/// With `facets`, the best `n` are chosen per facet combination. `n == 0`
/// keeps every row.
pub fn top_n<S: AsRef<str>>(
    combined: TableFrame,
    n: usize,
    metric: Option<&str>,
    facets: &[S],
) -> DatamartResult<TableFrame> {
    if n < 1 {
        return Ok(combined);
    }
    let default_metric = format!("{PERFORMANCE}{COMBINED_SUFFIX}");
    let metric = metric.unwrap_or(&default_metric);
    let responses = format!("{RESPONSE_COUNT}{COMBINED_SUFFIX}");
    let mut required: Vec<&str> = facets.iter().map(AsRef::as_ref).collect();
    required.extend([PREDICTOR_NAME, metric, responses.as_str()]);
    require(&combined, &required)?;

    let facet_keys = key_exprs(facets);
    let mut keys = facet_keys.clone();
    keys.push(col(PREDICTOR_NAME));

    let mut order: Vec<Expr> = facet_keys.to_vec();
    order.push(col(metric));
    let mut descending = vec![false; facet_keys.len()];
    descending.push(true);

    let rank = col(PREDICTOR_NAME).cum_count(false);
    let rank = if facet_keys.is_empty() {
        rank
    } else {
        rank.over(facet_keys)
    };
    let best = combined
        .lazy()
        .group_by(keys.clone())
        .agg([weighted_mean(col(metric), col(responses.as_str())).alias(metric)])
        .filter(col(metric).is_not_null().and(col(metric).is_not_nan()))
        .sort_by_exprs(
            order,
            SortMultipleOptions::default().with_order_descending_multi(descending),
        )
        .filter(rank.cast(DataType::Int64).lt_eq(lit(n as i64)))
        .select(keys.clone());

    tracing::debug!(n, metric, facets = keys.len() - 1, "keeping top predictors");
    Ok(combined.map(|lf| {
        lf.join(best, keys.clone(), keys, JoinArgs::new(JoinType::Semi))
    }))
}

/// Shape of [`predictor_performance_pivot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotOptions {
    /// Column whose values become the pivot rows.
    pub by: String,
    pub top_predictors: Option<usize>,
    pub top_groups: Option<usize>,
    /// Only predictors with entry type `Active`.
    pub active_only: bool,
}

impl Default for PivotOptions {
    fn default() -> Self {
        Self {
            by: NAME.to_string(),
            top_predictors: None,
            top_groups: None,
            active_only: false,
        }
    }
}

/// Response-weighted predictor performance per `by` group, one column per
/// predictor. Cells without data hold 0.5. Rows are ordered by their mean
/// performance and columns by theirs, both descending.
///
/// The output columns depend on the data, so this needs eager evaluation.
pub fn predictor_performance_pivot(
    combined: TableFrame,
    options: &PivotOptions,
    query: Option<&Query>,
    strategy: EvaluationStrategy,
) -> DatamartResult<DataFrame> {
    if !strategy.is_eager() {
        return Err(DatamartError::not_eager("predictor performance pivot"));
    }
    let by = options.by.as_str();
    let performance_bin = format!("{PERFORMANCE}{COMBINED_SUFFIX}");
    let responses_bin = format!("{RESPONSE_COUNT}{COMBINED_SUFFIX}");
    require(
        &combined,
        &[
            by,
            PREDICTOR_NAME,
            RESPONSE_COUNT,
            performance_bin.as_str(),
            responses_bin.as_str(),
        ],
    )?;

    let mut candidates = filtered(combined, query, strategy)?;
    if options.active_only {
        require(&candidates, &[ENTRY_TYPE])?;
        candidates =
            candidates.map(|lf| lf.filter(col(ENTRY_TYPE).cast(DataType::String).eq(lit("Active"))));
    }
    let frame = candidates
        .lazy()
        .filter(col(PREDICTOR_NAME).cast(DataType::String).neq(lit(CLASSIFIER_PREDICTOR)));
    let names = frame.clone().select([col(PREDICTOR_NAME)]).collect()?;
    let predictors = distinct_text(text_values(&names, PREDICTOR_NAME)?);

    let weighted = frame
        .filter(col(RESPONSE_COUNT).gt(lit(0)))
        .with_column(
            col(performance_bin.as_str())
                .cast(DataType::Float64)
                .fill_null(lit(BASELINE_PERFORMANCE)),
        )
        .group_by_stable([col(by), col(PREDICTOR_NAME)])
        .agg([weighted_mean(col(performance_bin.as_str()), col(responses_bin.as_str()))
            .alias(PERFORMANCE)])
        .collect()?;

    let pivot = pivot_performance(&weighted, by, &predictors)?;
    order_pivot(pivot, options)
}

fn distinct_text(values: Vec<Option<String>>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    values
        .into_iter()
        .flatten()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Group values and a `[group][predictor]` performance matrix.
struct Pivot {
    by: String,
    groups: Vec<Option<String>>,
    predictors: Vec<String>,
    cells: Vec<Vec<f64>>,
}

fn pivot_performance(df: &DataFrame, by: &str, predictors: &[String]) -> DatamartResult<Pivot> {
    let group_values = text_values(df, by)?;
    let names = text_values(df, PREDICTOR_NAME)?;
    let values = f64_values(df, PERFORMANCE)?;

    let predictor_index: FxHashMap<&str, usize> = predictors
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();
    let mut group_index: FxHashMap<Option<String>, usize> = FxHashMap::default();
    let mut groups = Vec::new();
    let mut cells: Vec<Vec<f64>> = Vec::new();

    for ((group, name), value) in group_values.into_iter().zip(names).zip(values) {
        let slot = *group_index.entry(group.clone()).or_insert_with(|| {
            groups.push(group);
            cells.push(vec![PIVOT_FILL_PERFORMANCE; predictors.len()]);
            groups.len() - 1
        });
        let Some(name) = name else {
            continue;
        };
        if let (Some(&p), Some(v)) = (predictor_index.get(name.as_str()), value) {
            cells[slot][p] = v;
        }
    }

    Ok(Pivot {
        by: by.to_string(),
        groups,
        predictors: predictors.to_vec(),
        cells,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        PIVOT_FILL_PERFORMANCE
    } else {
        sum / n as f64
    }
}

fn order_pivot(pivot: Pivot, options: &PivotOptions) -> DatamartResult<DataFrame> {
    let Pivot {
        by,
        groups,
        predictors,
        cells,
    } = pivot;

    let mut rows: Vec<usize> = (0..groups.len()).collect();
    let row_means: Vec<f64> = cells.iter().map(|r| mean(r.iter().copied())).collect();
    rows.sort_by(|&a, &b| row_means[b].total_cmp(&row_means[a]));

    let mut columns: Vec<usize> = (0..predictors.len()).collect();
    let column_means: Vec<f64> = columns
        .iter()
        .map(|&p| mean(cells.iter().map(|r| r[p])))
        .collect();
    if let Some(n) = options.top_groups {
        rows.truncate(n);
    }
    columns.sort_by(|&a, &b| column_means[b].total_cmp(&column_means[a]));
    if let Some(n) = options.top_predictors {
        columns.truncate(n);
    }

    let mut out: Vec<Column> = Vec::with_capacity(columns.len() + 1);
    let group_values: Vec<Option<String>> = rows.iter().map(|&g| groups[g].clone()).collect();
    out.push(Series::new(by.as_str().into(), group_values).into_column());
    for p in columns {
        let values: Vec<f64> = rows.iter().map(|&g| cells[g][p]).collect();
        out.push(Series::new(predictors[p].as_str().into(), values).into_column());
    }
    Ok(DataFrame::new(out)?)
}

//! Tests for latest snapshots, the combined view, summaries and health.

use modelwatch_core::errors::DatamartError;
use modelwatch_core::frame::{f64_values, i64_values, text_values};
use modelwatch_core::{EvaluationStrategy, TableFrame};
use modelwatch_datamart::aggregates::{
    predictor_counts, predictor_performance_pivot, CUM_MODELS, MODEL_COUNT, OVERALL,
    PERFORMANCE_WEIGHTED, POSITIVES_BIN, PREDICTOR_COUNT, TOTAL_MODELS_FRACTION,
    TOTAL_RESPONSE_FRACTION,
};
use modelwatch_datamart::health::model_health_stats;
use modelwatch_datamart::{
    combine, ingest, latest_snapshot, models_by_positives, response_gain, summarize, top_n,
    IngestOptions, PivotOptions, Query, TableSource,
};
use modelwatch_storage::JsonLinesReader;
use polars::df;
use polars::prelude::*;

const T1: &str = "20240101T000000.000 GMT";
const T2: &str = "20240102T000000.000 GMT";

fn ingested(model: DataFrame, predictor: Option<DataFrame>) -> (TableFrame, Option<TableFrame>) {
    let predictor = predictor.map_or(TableSource::Absent, TableSource::from);
    let outcome = ingest(
        model.into(),
        predictor,
        &IngestOptions::default(),
        &JsonLinesReader::new(),
    )
    .unwrap();
    (
        outcome.model.unwrap().frame,
        outcome.predictor.map(|t| t.frame),
    )
}

fn texts(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    text_values(df, column).unwrap()
}

fn close(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|v| (v - expected).abs() < 1e-12)
}

fn two_snapshots() -> TableFrame {
    let model = df![
        "ModelID" => ["A", "A", "B"],
        "Name" => ["OfferA", "OfferA", "OfferB"],
        "Channel" => ["Web", "Web", "Web"],
        "SnapshotTime" => [T1, T2, T2],
        "Positives" => [0i64, 5, 3],
        "ResponseCount" => [0i64, 10, 30],
        "Performance" => [0.5, 0.6, 0.8],
    ]
    .unwrap();
    ingested(model, None).0
}

fn model_and_predictors() -> (TableFrame, TableFrame) {
    let model = df![
        "ModelID" => ["A", "B"],
        "Name" => ["OfferA", "OfferB"],
        "Channel" => ["Web", "Email"],
        "SnapshotTime" => [T2, T2],
        "Positives" => [6i64, 4],
        "ResponseCount" => [10i64, 20],
        "Performance" => [0.6, 0.8],
    ]
    .unwrap();
    let predictor = df![
        "ModelID" => ["A", "A", "A", "C"],
        "PredictorName" => ["Customer.Age", "IH.Count", "Classifier", "Customer.Age"],
        "EntryType" => ["Active", "Active", "Classifier", "Active"],
        "BinPositives" => [1i64, 2, 3, 4],
        "BinNegatives" => [1i64, 2, 3, 4],
        "ResponseCount" => [10i64, 10, 10, 5],
        "Performance" => [0.7, 0.55, 0.6, 0.9],
        "SnapshotTime" => [T2, T2, T2, T2],
    ]
    .unwrap();
    let (model, predictor) = ingested(model, Some(predictor));
    (model, predictor.unwrap())
}

#[test]
fn test_latest_snapshot_is_idempotent() {
    let once = latest_snapshot(two_snapshots()).collect().unwrap();
    let twice = latest_snapshot(latest_snapshot(two_snapshots())).collect().unwrap();
    assert_eq!(once.height(), 2);
    assert!(once.equals_missing(&twice));
}

#[test]
fn test_latest_snapshot_keeps_tables_without_time_axis() {
    let model = df!["ModelID" => ["A", "B"], "Positives" => [1i64, 2]].unwrap();
    let (frame, _) = ingested(model, None);
    assert_eq!(latest_snapshot(frame).collect().unwrap().height(), 2);
}

#[test]
fn test_combine_keeps_only_models_in_both_tables() {
    let (model, predictor) = model_and_predictors();
    let combined = combine(model.clone(), predictor, true).collect().unwrap();
    assert_eq!(combined.height(), 3);
    assert!(texts(&combined, "ModelID")
        .iter()
        .all(|id| id.as_deref() == Some("A")));

    // Every input column survives, colliding predictor columns with a suffix.
    for name in model.column_names().unwrap() {
        assert!(combined.get_column_index(&name).is_some(), "{name}");
    }
    for name in ["PredictorName", "BinPositives", "PerformanceBin", "ResponseCountBin"] {
        assert!(combined.get_column_index(name).is_some(), "{name}");
    }
}

#[test]
fn test_summary_weights_performance_by_responses() {
    let (model, _) = model_and_predictors();
    let model = model.map(|lf| lf.with_column(lit("All").alias("Group")));
    let summary = summarize(model, &["Group"], None, EvaluationStrategy::Eager)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(summary.height(), 1);
    assert_eq!(i64_values(&summary, "count").unwrap(), vec![Some(2)]);
    assert_eq!(f64_values(&summary, "ResponseCount_sum").unwrap(), vec![Some(30.0)]);
    let weighted = f64_values(&summary, PERFORMANCE_WEIGHTED).unwrap()[0];
    assert!(close(weighted, (10.0 * 0.6 + 20.0 * 0.8) / 30.0));
    assert!((weighted.unwrap() - 0.733).abs() < 1e-3);
}

#[test]
fn test_summary_uses_latest_snapshot_and_query() {
    let by_channel = summarize(two_snapshots(), &["Channel"], None, EvaluationStrategy::Eager)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(i64_values(&by_channel, "count").unwrap(), vec![Some(2)]);
    assert_eq!(
        i64_values(&by_channel, "Count_without_responses").unwrap(),
        vec![Some(0)]
    );

    let query = Query::predicate(col("Positives").gt(lit(4)));
    let filtered =
        summarize(two_snapshots(), &["Channel"], Some(&query), EvaluationStrategy::Eager)
            .unwrap()
            .collect()
            .unwrap();
    assert_eq!(i64_values(&filtered, "count").unwrap(), vec![Some(1)]);
}

#[test]
fn test_summary_without_keys_is_one_row() {
    let keys: [&str; 0] = [];
    let summary = summarize(two_snapshots(), &keys, None, EvaluationStrategy::Eager)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(summary.height(), 1);
    assert_eq!(i64_values(&summary, "count").unwrap(), vec![Some(2)]);
}

#[test]
fn test_summary_requires_group_columns() {
    let err = summarize(two_snapshots(), &["Issue"], None, EvaluationStrategy::Eager).unwrap_err();
    match err {
        DatamartError::MissingColumns { columns, .. } => assert_eq!(columns, vec!["Issue"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_health_buckets_use_latest_snapshot() {
    let latest = model_health_stats(two_snapshots(), &["Channel", "Issue"], true).unwrap();
    assert_eq!(latest.total, 2);
    assert_eq!(latest.snapshots, 1);
    assert_eq!(latest.empty, 0);
    assert_eq!(latest.immature, 2);
    assert_eq!(latest.non_performing, 2);
    // Issue is not a column, so only Channel is checked.
    assert_eq!(latest.missing_by_key, vec![("Channel".to_string(), 0)]);

    let all = model_health_stats(two_snapshots(), &["Channel"], false).unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.snapshots, 2);
    assert_eq!(all.empty, 1);
    assert_eq!(all.bottom_left, 1);
    // The empty row is also immature: buckets overlap.
    assert_eq!(all.non_performing, 4);
}

#[test]
fn test_health_counts_a_null_snapshot_as_one_value() {
    let model = df![
        "ModelID" => ["A", "B"],
        "Positives" => [1i64, 0],
        "ResponseCount" => [10i64, 0],
        "Performance" => [0.6, 0.5],
    ]
    .unwrap();
    let (frame, _) = ingested(model, None);
    let stats = model_health_stats(frame, &["Channel"], true).unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.total, 2);
    assert!(stats.missing_by_key.is_empty());
}

#[test]
fn test_predictor_counts_exclude_the_classifier() {
    let (model, predictor) = model_and_predictors();
    let combined = combine(model, predictor, true);
    let counts = predictor_counts(combined, "Channel", None, EvaluationStrategy::Eager)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(counts.height(), 2);
    let channels = texts(&counts, "Channel");
    assert!(channels.contains(&Some(OVERALL.to_string())));
    assert!(channels.contains(&Some("Web".to_string())));
    assert_eq!(
        i64_values(&counts, PREDICTOR_COUNT).unwrap(),
        vec![Some(2), Some(2)]
    );
}

#[test]
fn test_pivot_is_eager_only() {
    let (model, predictor) = model_and_predictors();
    let combined = combine(model, predictor, true);
    let err = predictor_performance_pivot(
        combined,
        &PivotOptions::default(),
        None,
        EvaluationStrategy::Deferred,
    )
    .unwrap_err();
    assert!(err.is_not_eager());
}

#[test]
fn test_pivot_orders_predictors_by_performance() {
    let (model, predictor) = model_and_predictors();
    let combined = combine(model, predictor, true);
    let pivot = predictor_performance_pivot(
        combined,
        &PivotOptions::default(),
        None,
        EvaluationStrategy::Eager,
    )
    .unwrap();
    assert_eq!(pivot.height(), 1);
    let names: Vec<&str> = pivot.get_column_names().into_iter().map(|n| n.as_str()).collect();
    assert_eq!(names, vec!["Name", "Customer.Age", "IH.Count"]);
    assert!(close(f64_values(&pivot, "Customer.Age").unwrap()[0], 0.7));
}

fn gain_models() -> TableFrame {
    let model = df![
        "ModelID" => ["A", "A", "B", "C", "D"],
        "Channel" => ["Web", "Web", "Web", "Web", "Email"],
        "SnapshotTime" => [T1, T2, T2, T2, T2],
        "Positives" => [1i64, 4, 15, 250, 0],
        "ResponseCount" => [10i64, 60, 30, 10, 5],
        "Performance" => [0.5, 0.6, 0.7, 0.8, 0.5],
    ]
    .unwrap();
    ingested(model, None).0
}

#[test]
fn test_response_gain_accumulates_per_group() {
    let gain = response_gain(gain_models(), "Channel").unwrap().collect().unwrap();
    // Groups descending, largest response counts first.
    assert_eq!(
        texts(&gain, "ModelID"),
        vec![
            Some("A".to_string()),
            Some("B".to_string()),
            Some("C".to_string()),
            Some("D".to_string())
        ]
    );
    let responses = f64_values(&gain, TOTAL_RESPONSE_FRACTION).unwrap();
    assert!(close(responses[0], 0.6));
    assert!(close(responses[1], 0.9));
    assert!(close(responses[2], 1.0));
    assert!(close(responses[3], 1.0));
    let models = f64_values(&gain, TOTAL_MODELS_FRACTION).unwrap();
    assert!(close(models[0], 1.0 / 3.0));
    assert!(close(models[2], 1.0));
    assert!(close(models[3], 1.0));
}

#[test]
fn test_models_by_positives_bins_and_accumulates() {
    let latest = latest_snapshot(gain_models());
    let bins = models_by_positives(latest, "Channel").unwrap().collect().unwrap();
    assert_eq!(
        texts(&bins, POSITIVES_BIN),
        vec![
            Some("(-inf, 0]".to_string()),
            Some("(0, 10]".to_string()),
            Some("(10, 20]".to_string()),
            Some("(200, inf]".to_string())
        ]
    );
    assert_eq!(
        texts(&bins, "Channel"),
        vec![
            Some("Email".to_string()),
            Some("Web".to_string()),
            Some("Web".to_string()),
            Some("Web".to_string())
        ]
    );
    assert_eq!(
        i64_values(&bins, MODEL_COUNT).unwrap(),
        vec![Some(1), Some(1), Some(1), Some(1)]
    );
    let cumulative = f64_values(&bins, CUM_MODELS).unwrap();
    assert!(close(cumulative[0], 1.0));
    assert!(close(cumulative[1], 1.0 / 3.0));
    assert!(close(cumulative[2], 2.0 / 3.0));
    assert!(close(cumulative[3], 1.0));
}

#[test]
fn test_top_n_keeps_the_best_predictors() {
    let (model, predictor) = model_and_predictors();
    let combined = combine(model, predictor, true);

    let all = top_n(combined.clone(), 0, None, &[] as &[&str]).unwrap();
    assert_eq!(all.collect().unwrap().height(), 3);

    let best = top_n(combined.clone(), 1, None, &[] as &[&str]).unwrap().collect().unwrap();
    assert_eq!(texts(&best, "PredictorName"), vec![Some("Customer.Age".to_string())]);

    let per_entry = top_n(combined, 1, None, &["EntryType"]).unwrap().collect().unwrap();
    let mut kept = texts(&per_entry, "PredictorName");
    kept.sort();
    assert_eq!(
        kept,
        vec![Some("Classifier".to_string()), Some("Customer.Age".to_string())]
    );
}

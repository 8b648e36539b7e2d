//! Tests for the labelled table handle and the expression glue.

use modelwatch_core::frame::{
    categorical, f64_values, last_change, safe_div, scalar_f64, text_values, weighted_mean,
    TableFrame, TableHandle,
};
use modelwatch_core::{initialize_shared_categorical_registry, FrameError};
use polars::df;
use polars::prelude::*;

fn models() -> DataFrame {
    df![
        "ModelID" => ["A", "A", "B", "C"],
        "Channel" => ["Web", "Web", "Email", "Web"],
        "Positives" => [0i64, 5, 3, 1],
        "ResponseCount" => [0i64, 10, 30, 10],
    ]
    .unwrap()
}

#[test]
fn deferred_steps_do_not_run_until_collect() {
    let frame = TableFrame::materialized("model data", models()).map(|lf| {
        lf.filter(col("ResponseCount").gt(lit(0)))
            .with_column(safe_div(col("Positives"), col("ResponseCount")).alias("SuccessRate"))
    });

    assert!(frame.is_deferred());
    let schema = frame.schema().unwrap();
    assert_eq!(schema.get("SuccessRate"), Some(&DataType::Float64));

    let df = frame.collect().unwrap();
    assert_eq!(df.height(), 3);
    assert_eq!(f64_values(&df, "SuccessRate").unwrap()[0], Some(0.5));
}

#[test]
fn handles_agree_on_schema_and_state() {
    let df = models();
    let lf = df.clone().lazy();
    assert!(!df.is_deferred());
    assert!(lf.is_deferred());
    assert_eq!(
        TableHandle::schema(&df).unwrap(),
        TableHandle::schema(&lf).unwrap()
    );

    let wrapped = TableFrame::from_handle("model data", &lf).unwrap();
    assert!(!wrapped.is_materialized());
    let wrapped = TableFrame::from_handle("model data", &df).unwrap();
    assert!(wrapped.is_materialized());
}

#[test]
fn schema_errors_surface_before_execution() {
    let frame = TableFrame::deferred(
        "model data",
        models().lazy().filter(col("Performance").gt(lit(0.5))),
    );
    assert!(matches!(frame.schema(), Err(FrameError::Polars(_))));
    assert!(frame.collect().is_err());
}

#[test]
fn safe_div_is_null_on_zero_denominator() {
    let out = models()
        .lazy()
        .select([safe_div(col("Positives"), col("ResponseCount")).alias("rate")])
        .collect()
        .unwrap();
    assert_eq!(
        f64_values(&out, "rate").unwrap(),
        vec![None, Some(0.5), Some(0.1), Some(0.1)]
    );
}

#[test]
fn weighted_mean_per_group_and_zero_weight() {
    let frame = df![
        "Channel" => ["Web", "Web", "Email"],
        "Performance" => [0.6, 0.8, 0.7],
        "ResponseCount" => [1.0, 3.0, 0.0],
    ]
    .unwrap();
    let out = frame
        .lazy()
        .group_by([col("Channel")])
        .agg([weighted_mean(col("Performance"), col("ResponseCount")).alias("Performance")])
        .sort(["Channel"], SortMultipleOptions::default())
        .collect()
        .unwrap();
    let values = f64_values(&out, "Performance").unwrap();
    assert_eq!(values[0], None);
    assert!((values[1].unwrap() - 0.75).abs() < 1e-12);
}

#[test]
fn last_change_tracks_counter_updates_per_model() {
    let frame = df![
        "ModelID" => ["A", "A", "A", "B"],
        "Positives" => [1i64, 1, 4, 7],
        "SnapshotTime" => [3i64, 1, 2, 1],
    ]
    .unwrap();
    let out = frame
        .lazy()
        .with_column(last_change("Positives", "SnapshotTime", "ModelID").alias("Last"))
        .collect()
        .unwrap();
    // Ordered by time, A goes 1 -> 4 -> 1: both updates count, the later wins.
    assert_eq!(
        f64_values(&out, "Last").unwrap(),
        vec![Some(3.0), Some(3.0), Some(3.0), None]
    );
}

#[test]
fn categorical_values_read_back_as_text() {
    initialize_shared_categorical_registry();
    let out = models()
        .lazy()
        .with_column(col("Channel").cast(categorical()))
        .collect()
        .unwrap();
    assert!(matches!(
        out.column("Channel").unwrap().dtype(),
        DataType::Categorical(..)
    ));
    assert_eq!(
        text_values(&out, "Channel").unwrap(),
        vec![
            Some("Web".to_string()),
            Some("Web".to_string()),
            Some("Email".to_string()),
            Some("Web".to_string())
        ]
    );
}

#[test]
fn keyless_aggregate_on_empty_frame_has_one_row() {
    let empty = models().head(Some(0));
    let out = empty
        .lazy()
        .select([col("ResponseCount").sum().alias("total")])
        .collect()
        .unwrap();
    assert_eq!(out.height(), 1);
    assert_eq!(scalar_f64(&out, "total").unwrap(), Some(0.0));
}

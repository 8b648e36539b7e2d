use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use modelwatch_core::frame::{f64_values, text_values};
use modelwatch_core::TableFrame;
use modelwatch_datamart::resolver::expected_columns;
use modelwatch_datamart::{combine, ingest, latest_snapshot, resolve, IngestOptions, TableSource};
use modelwatch_storage::JsonLinesReader;
use polars::prelude::*;
use proptest::prelude::*;

const NAMES: &[&str] = &[
    "pyModelID", "ModelID", "pyName", "ModelName", "Channel", "pxChannel", "Positives",
    "pyResponseCount", "Performance", "Custom", "Extra", "pzInsKey", "BinPositives",
];

fn day(d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Export spelling of a snapshot day.
fn stamp(d: Option<u32>) -> Option<String> {
    d.map(|d| day(d).format("%Y%m%dT%H%M%S%.3f GMT").to_string())
}

fn counts(rows: &[(i64, i64)], bins: bool) -> DataFrame {
    let ids: Vec<String> = (0..rows.len()).map(|i| format!("M{i}")).collect();
    let (positives, negatives): (Vec<i64>, Vec<i64>) = rows.iter().copied().unzip();
    let (p, n) = if bins { ("BinPositives", "BinNegatives") } else { ("Positives", "Negatives") };
    let mut columns = vec![
        Column::new("ModelID".into(), ids),
        Column::new(p.into(), positives.clone()),
        Column::new(n.into(), negatives.clone()),
    ];
    if !bins {
        let responses: Vec<i64> = positives.iter().zip(&negatives).map(|(p, n)| p + n).collect();
        columns.push(Column::new("ResponseCount".into(), responses));
    }
    DataFrame::new(columns).unwrap()
}

fn snapshots(rows: &[(u8, Option<u32>)], predictor: bool) -> DataFrame {
    let ids: Vec<String> = rows.iter().map(|(id, _)| format!("M{id}")).collect();
    let times: Vec<Option<String>> = rows.iter().map(|(_, d)| stamp(*d)).collect();
    let mut columns = vec![
        Column::new("ModelID".into(), ids),
        Column::new("SnapshotTime".into(), times),
    ];
    if predictor {
        columns.push(Column::new("PredictorName".into(), vec!["Customer.Age"; rows.len()]));
    } else {
        columns.push(Column::new("Positives".into(), vec![1i64; rows.len()]));
        columns.push(Column::new("ResponseCount".into(), vec![2i64; rows.len()]));
    }
    DataFrame::new(columns).unwrap()
}

fn ingest_one(df: DataFrame, as_predictor: bool) -> DataFrame {
    let (model, predictor) = if as_predictor {
        (TableSource::Absent, TableSource::from(df))
    } else {
        (TableSource::from(df), TableSource::Absent)
    };
    let outcome = ingest(model, predictor, &IngestOptions::default(), &JsonLinesReader::new()).unwrap();
    let frame = if as_predictor { outcome.predictor } else { outcome.model };
    frame.unwrap().frame.collect().unwrap()
}

fn model_ids(frame: TableFrame) -> BTreeSet<String> {
    let df = frame.collect().unwrap();
    text_values(&df, "ModelID").unwrap().into_iter().flatten().collect()
}

proptest! {
    #[test]
    fn resolved_and_missing_partition_the_expected_set(
        picks in prop::collection::btree_set(0..NAMES.len(), 0..NAMES.len()),
        include in prop::collection::vec("[A-Z][a-z]{1,6}", 0..3),
        exclude in prop::collection::vec(prop::sample::select(vec!["Issue", "Treatment", "Channel"]), 0..2),
    ) {
        let schema: Schema = picks
            .iter()
            .map(|&i| Field::new(NAMES[i].into(), DataType::String))
            .collect();
        let include: Vec<String> = include;
        let exclude: Vec<String> = exclude.into_iter().map(str::to_string).collect();
        let resolution = resolve(&schema, include.as_slice(), exclude.as_slice());

        prop_assert!(resolution.resolved.is_disjoint(&resolution.missing));
        let union: BTreeSet<String> =
            resolution.resolved.union(&resolution.missing).cloned().collect();
        prop_assert_eq!(union, expected_columns(include.as_slice(), exclude.as_slice()));
    }

    #[test]
    fn success_rate_stays_in_unit_interval(rows in prop::collection::vec((0i64..500, 0i64..500), 1..30)) {
        let df = ingest_one(counts(&rows, false), false);
        let rates = f64_values(&df, "SuccessRate").unwrap();
        for ((p, n), rate) in rows.iter().zip(rates) {
            prop_assert!(rate.is_some());
            let rate = rate.unwrap();
            prop_assert!((0.0..=1.0).contains(&rate));
            if p + n == 0 {
                prop_assert_eq!(rate, 0.0);
            }
        }
    }

    #[test]
    fn adjusted_propensity_is_strictly_inside_unit_interval(rows in prop::collection::vec((0i64..500, 0i64..500), 1..30)) {
        let df = ingest_one(counts(&rows, true), true);
        for value in f64_values(&df, "BinAdjustedPropensity").unwrap() {
            let value = value.unwrap();
            prop_assert!(value > 0.0 && value < 1.0);
        }
    }

    #[test]
    fn latest_snapshot_is_idempotent(days in prop::collection::vec(prop::option::of(1u32..28), 1..30)) {
        let rows: Vec<(u8, Option<u32>)> = days.iter().enumerate().map(|(i, d)| (i as u8, *d)).collect();
        let df = ingest_one(snapshots(&rows, false), false);
        let frame = TableFrame::materialized("model data", df);
        let once = latest_snapshot(frame.clone()).collect().unwrap();
        let twice = latest_snapshot(latest_snapshot(frame)).collect().unwrap();
        prop_assert!(once.height() >= 1);
        prop_assert!(once.equals_missing(&twice));
    }

    #[test]
    fn combined_models_are_in_both_latest_snapshots(
        model_rows in prop::collection::vec((0u8..6, prop::option::of(1u32..4)), 1..20),
        predictor_rows in prop::collection::vec((0u8..6, prop::option::of(1u32..4)), 1..20),
    ) {
        let outcome = ingest(
            snapshots(&model_rows, false).into(),
            snapshots(&predictor_rows, true).into(),
            &IngestOptions::default(),
            &JsonLinesReader::new(),
        )
        .unwrap();
        let model = outcome.model.unwrap().frame;
        let predictor = outcome.predictor.unwrap().frame;

        let latest_models = model_ids(latest_snapshot(model.clone()));
        let latest_predictors = model_ids(latest_snapshot(predictor.clone()));
        let both: BTreeSet<String> = latest_models.intersection(&latest_predictors).cloned().collect();

        let combined = model_ids(combine(model, predictor, true));
        prop_assert!(combined.is_subset(&both));
        prop_assert_eq!(combined, both);
    }
}

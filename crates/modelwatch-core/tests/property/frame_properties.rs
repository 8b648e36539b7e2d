use modelwatch_core::frame::{f64_values, safe_div, scalar_f64, weighted_mean};
use polars::prelude::*;
use proptest::prelude::*;

fn counts_frame(rows: &[(i64, i64)]) -> DataFrame {
    let positives: Vec<i64> = rows.iter().map(|(p, _)| *p).collect();
    let responses: Vec<i64> = rows.iter().map(|(p, n)| p + n).collect();
    DataFrame::new(vec![
        Column::new("Positives".into(), positives),
        Column::new("ResponseCount".into(), responses),
    ])
    .unwrap()
}

proptest! {
    #[test]
    fn success_rate_stays_in_unit_interval(rows in prop::collection::vec((0i64..1000, 0i64..1000), 0..50)) {
        let out = counts_frame(&rows)
            .lazy()
            .select([safe_div(col("Positives"), col("ResponseCount")).fill_null(lit(0.0)).alias("rate")])
            .collect()
            .unwrap();
        for value in f64_values(&out, "rate").unwrap() {
            let v = value.unwrap();
            prop_assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn filter_never_grows_a_table(rows in prop::collection::vec((0i64..100, 0i64..100), 0..50), threshold in 0i64..200) {
        let frame = counts_frame(&rows);
        let height = frame.height();
        let out = frame
            .lazy()
            .filter(col("ResponseCount").gt(lit(threshold)))
            .collect()
            .unwrap();
        prop_assert!(out.height() <= height);
    }

    #[test]
    fn weighted_mean_lies_between_extremes(rows in prop::collection::vec((0i64..100, 1i64..100), 1..50)) {
        let out = counts_frame(&rows)
            .lazy()
            .select([weighted_mean(col("Positives"), col("ResponseCount")).alias("mean")])
            .collect()
            .unwrap();
        let mean = scalar_f64(&out, "mean").unwrap().unwrap();
        let lo = rows.iter().map(|(p, _)| *p).min().unwrap() as f64;
        let hi = rows.iter().map(|(p, _)| *p).max().unwrap() as f64;
        prop_assert!(mean >= lo - 1e-9 && mean <= hi + 1e-9);
    }
}

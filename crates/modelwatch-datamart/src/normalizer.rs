//! Type normalizer: recasts canonical columns to their semantic types and
//! guarantees a `SnapshotTime` column.

use modelwatch_core::constants::{CATEGORICAL_COLUMNS, FLOAT_COLUMNS, SNAPSHOT_TIME};
use modelwatch_core::errors::FrameError;
use modelwatch_core::frame::{categorical, null_of, scalar_i64, timestamp_type};
use modelwatch_core::{EvaluationStrategy, FrameResult, TableFrame};
use polars::prelude::*;

/// Trailing characters of a textual time zone (`GMT`, `UTC`, ...).
const ZONE_CHARS: &str = " ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// How text and numeric columns are coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// chrono strftime format of textual snapshot times.
    pub timestamp_format: String,
    /// Fail on values that cannot be coerced instead of nulling them.
    pub strict: bool,
}

/// A conversion the normalizer applies to one existing column.
struct Coercion {
    column: &'static str,
    target: &'static str,
    expr: Expr,
}

fn cast_to(name: &str, dtype: DataType, strict: bool) -> Expr {
    if strict {
        col(name).strict_cast(dtype)
    } else {
        col(name).cast(dtype)
    }
}

/// Parse textual `SnapshotTime` values with a chrono format. A trailing `%Z`
/// is matched by dropping the zone name, which chrono cannot parse.
pub fn parse_timestamp(format: &str, strict: bool) -> Expr {
    let (format, raw) = match format.strip_suffix("%Z") {
        Some(head) => (
            head.trim_end(),
            col(SNAPSHOT_TIME).str().strip_chars_end(lit(ZONE_CHARS)),
        ),
        None => (format, col(SNAPSHOT_TIME)),
    };
    raw.str().to_datetime(
        Some(TimeUnit::Milliseconds),
        None,
        StrptimeOptions {
            format: Some(format.into()),
            strict,
            exact: true,
            cache: true,
        },
        lit("raise"),
    )
}

fn coercions(schema: &Schema, options: &NormalizeOptions, strict: bool) -> Vec<Coercion> {
    let mut out = Vec::new();
    for &name in FLOAT_COLUMNS {
        if matches!(schema.get(name), Some(dtype) if dtype != &DataType::Float64) {
            out.push(Coercion {
                column: name,
                target: "Float64",
                expr: cast_to(name, DataType::Float64, strict),
            });
        }
    }
    let snapshot = match schema.get(SNAPSHOT_TIME) {
        None | Some(DataType::Datetime(..)) => None,
        Some(DataType::String) => Some(parse_timestamp(&options.timestamp_format, strict)),
        Some(_) => Some(cast_to(SNAPSHOT_TIME, timestamp_type(), strict)),
    };
    if let Some(expr) = snapshot {
        out.push(Coercion {
            column: SNAPSHOT_TIME,
            target: "Datetime",
            expr,
        });
    }
    out
}

/// Expressions that bring `schema` to its normalized types. Columns of the
/// retype set that are absent stay absent, except `SnapshotTime`, which is
/// added as an all-null timestamp column.
pub fn normalization_exprs(schema: &Schema, options: &NormalizeOptions) -> Vec<Expr> {
    let mut exprs = Vec::new();

    for &name in CATEGORICAL_COLUMNS {
        if matches!(schema.get(name), Some(dtype) if !matches!(dtype, DataType::Categorical(..))) {
            exprs.push(col(name).cast(DataType::String).cast(categorical()));
        }
    }
    exprs.extend(
        coercions(schema, options, options.strict)
            .into_iter()
            .map(|c| c.expr.alias(c.column)),
    );
    if !schema.contains(SNAPSHOT_TIME) {
        exprs.push(null_of(timestamp_type()).alias(SNAPSHOT_TIME));
    }

    exprs
}

/// Values that a strict coercion would reject, counted per column. The first
/// column with rejects becomes a [`FrameError::Format`].
fn check_strict_coercions(
    frame: &TableFrame,
    schema: &Schema,
    options: &NormalizeOptions,
) -> FrameResult<()> {
    let checks = coercions(schema, options, false);
    if checks.is_empty() {
        return Ok(());
    }
    let counts = frame
        .lazy()
        .select(
            checks
                .iter()
                .map(|c| {
                    col(c.column)
                        .is_not_null()
                        .and(c.expr.clone().is_null())
                        .sum()
                        .alias(c.column)
                })
                .collect::<Vec<_>>(),
        )
        .collect()?;
    for check in &checks {
        let count = scalar_i64(&counts, check.column)?.unwrap_or(0);
        if count > 0 {
            return Err(FrameError::Format {
                column: check.column.to_string(),
                count: count as usize,
                target: check.target.to_string(),
            });
        }
    }
    Ok(())
}

/// Normalize `frame`.
///
/// Strict coercion failures surface as [`FrameError::Format`] right away
/// under eager evaluation. Under deferred evaluation the plan itself is
/// strict and fails when the frame is materialized.
pub fn normalize(
    frame: TableFrame,
    options: &NormalizeOptions,
    strategy: EvaluationStrategy,
) -> FrameResult<TableFrame> {
    let schema = frame.schema()?;
    if options.strict && strategy.is_eager() {
        check_strict_coercions(&frame, &schema, options)?;
    }
    let exprs = normalization_exprs(&schema, options);
    tracing::debug!(
        table = frame.label(),
        steps = exprs.len(),
        "normalizing column types"
    );
    if exprs.is_empty() {
        return Ok(frame);
    }
    Ok(frame.map(|lf| lf.with_columns(exprs)))
}

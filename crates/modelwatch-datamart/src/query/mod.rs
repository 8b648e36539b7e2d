//! Query filter: one filter definition applied uniformly to either table.

mod parser;

pub use parser::parse_query;

use modelwatch_core::errors::QueryError;
use modelwatch_core::frame::referenced_columns;
use modelwatch_core::{query_span, EvaluationStrategy, TableFrame};
use polars::prelude::*;

/// A row filter.
#[derive(Debug, Clone)]
pub enum Query {
    /// Boolean expression over column references.
    Predicate(Expr),
    /// Keep rows whose column value, compared as text, is one of the allowed
    /// values; pairs are combined with AND.
    ValuesIn(Vec<(String, Vec<String>)>),
    /// Textual predicate in the query language of [`parse_query`]. Only
    /// evaluated against materialized tables.
    Raw(String),
}

impl Query {
    pub fn predicate(expr: Expr) -> Self {
        Self::Predicate(expr)
    }

    pub fn values_in<C, V, I>(pairs: impl IntoIterator<Item = (C, I)>) -> Self
    where
        C: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = V>,
    {
        Self::ValuesIn(
            pairs
                .into_iter()
                .map(|(column, values)| {
                    (column.into(), values.into_iter().map(Into::into).collect())
                })
                .collect(),
        )
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Predicate(_) => "predicate",
            Self::ValuesIn(_) => "values_in",
            Self::Raw(_) => "raw",
        }
    }

    /// Whether applying this query needs a materialized table.
    pub fn requires_eager(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Translate into a single predicate expression.
    pub fn to_expr(&self) -> Result<Expr, QueryError> {
        match self {
            Self::Predicate(expr) => Ok(expr.clone()),
            Self::ValuesIn(pairs) => {
                let mut conjunction: Option<Expr> = None;
                for (column, values) in pairs {
                    if column.trim().is_empty() {
                        return Err(QueryError::InvalidValues {
                            column: column.clone(),
                            message: "column name must not be empty".to_string(),
                        });
                    }
                    let allowed = Series::new(column.as_str().into(), values.clone());
                    let term = col(column.as_str())
                        .cast(DataType::String)
                        .is_in(lit(allowed));
                    conjunction = Some(match conjunction {
                        Some(acc) => acc.and(term),
                        None => term,
                    });
                }
                conjunction.ok_or_else(|| QueryError::InvalidValues {
                    column: String::new(),
                    message: "at least one column is required".to_string(),
                })
            }
            Self::Raw(text) => parse_query(text),
        }
    }
}

impl From<Expr> for Query {
    fn from(expr: Expr) -> Self {
        Self::Predicate(expr)
    }
}

/// Columns referenced by `expr` that `schema` lacks, sorted by name.
pub fn missing_columns(expr: &Expr, schema: &Schema) -> Vec<String> {
    referenced_columns(expr)
        .into_iter()
        .filter(|name| !schema.contains(name))
        .collect()
}

/// Filter `frame` by `query`.
///
/// Fails with [`QueryError::ColumnNotFound`] naming exactly the columns the
/// query references but the table lacks, and with [`QueryError::NotEager`]
/// for raw queries under deferred evaluation.
pub fn apply_query(
    frame: TableFrame,
    query: &Query,
    strategy: EvaluationStrategy,
) -> Result<TableFrame, QueryError> {
    let _span = query_span!(frame.label(), query.kind()).entered();

    if query.requires_eager() && !strategy.is_eager() {
        return Err(QueryError::NotEager {
            operation: "raw query filtering".to_string(),
        });
    }

    let predicate = query.to_expr()?;
    let schema = frame.schema()?;
    let missing = missing_columns(&predicate, &schema);
    if !missing.is_empty() {
        return Err(QueryError::ColumnNotFound {
            table: frame.label().to_string(),
            columns: missing,
        });
    }

    if query.requires_eager() {
        let filtered = frame.collect()?.lazy().filter(predicate).collect()?;
        tracing::debug!(table = frame.label(), rows = filtered.height(), "raw query applied");
        return Ok(TableFrame::materialized(frame.label(), filtered));
    }

    tracing::debug!(table = frame.label(), ?predicate, "query applied");
    Ok(frame.map(|lf| lf.filter(predicate)))
}

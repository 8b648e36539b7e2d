//! Uniform access to deferred and materialized tables.

use std::fmt;
use std::sync::Arc;

use polars::prelude::*;

use super::FrameResult;
use crate::types::EvaluationStrategy;

/// Shared interface of polars' `LazyFrame` and `DataFrame`.
///
/// `materialize` is explicit and idempotent: materializing a materialized
/// table returns the same data without recomputation.
pub trait TableHandle {
    fn schema(&self) -> FrameResult<SchemaRef>;

    /// A deferred view that downstream steps can extend.
    fn to_lazy(&self) -> LazyFrame;

    fn materialize(&self) -> FrameResult<DataFrame>;

    /// True when steps are still pending.
    fn is_deferred(&self) -> bool;
}

impl TableHandle for LazyFrame {
    fn schema(&self) -> FrameResult<SchemaRef> {
        Ok(self.clone().collect_schema()?)
    }

    fn to_lazy(&self) -> LazyFrame {
        self.clone()
    }

    fn materialize(&self) -> FrameResult<DataFrame> {
        Ok(self.clone().collect()?)
    }

    fn is_deferred(&self) -> bool {
        true
    }
}

impl TableHandle for DataFrame {
    fn schema(&self) -> FrameResult<SchemaRef> {
        Ok(self.clone().lazy().collect_schema()?)
    }

    fn to_lazy(&self) -> LazyFrame {
        self.clone().lazy()
    }

    fn materialize(&self) -> FrameResult<DataFrame> {
        Ok(self.clone())
    }

    fn is_deferred(&self) -> bool {
        false
    }
}

#[derive(Clone)]
enum FrameState {
    Materialized(DataFrame),
    Deferred(LazyFrame),
}

/// A labelled table that is either materialized or a pending plan.
#[derive(Clone)]
pub struct TableFrame {
    label: Arc<str>,
    state: FrameState,
}

impl TableFrame {
    pub fn materialized(label: impl Into<Arc<str>>, df: DataFrame) -> Self {
        Self {
            label: label.into(),
            state: FrameState::Materialized(df),
        }
    }

    pub fn deferred(label: impl Into<Arc<str>>, lf: LazyFrame) -> Self {
        Self {
            label: label.into(),
            state: FrameState::Deferred(lf),
        }
    }

    /// Wrap any handle, keeping its state.
    pub fn from_handle<H: TableHandle>(label: impl Into<Arc<str>>, handle: &H) -> FrameResult<Self> {
        if handle.is_deferred() {
            Ok(Self::deferred(label, handle.to_lazy()))
        } else {
            Ok(Self::materialized(label, handle.materialize()?))
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = label.into();
        self
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.state, FrameState::Materialized(_))
    }

    pub fn as_materialized(&self) -> Option<&DataFrame> {
        match &self.state {
            FrameState::Materialized(df) => Some(df),
            FrameState::Deferred(_) => None,
        }
    }

    pub fn lazy(&self) -> LazyFrame {
        match &self.state {
            FrameState::Materialized(df) => df.clone().lazy(),
            FrameState::Deferred(lf) => lf.clone(),
        }
    }

    /// Execute pending steps, leaving `self` untouched.
    pub fn collect(&self) -> FrameResult<DataFrame> {
        match &self.state {
            FrameState::Materialized(df) => Ok(df.clone()),
            FrameState::Deferred(lf) => Ok(lf.clone().collect()?),
        }
    }

    pub fn materialize(self) -> FrameResult<Self> {
        match self.state {
            FrameState::Materialized(_) => Ok(self),
            FrameState::Deferred(lf) => {
                tracing::trace!(table = %self.label, "materializing");
                Ok(Self::materialized(self.label, lf.collect()?))
            }
        }
    }

    /// Materialize under the eager strategy, keep the plan otherwise.
    pub fn settle(self, strategy: EvaluationStrategy) -> FrameResult<Self> {
        if strategy.is_eager() {
            self.materialize()
        } else {
            Ok(self)
        }
    }

    /// Append a plan step. The result is always deferred.
    pub fn map(self, step: impl FnOnce(LazyFrame) -> LazyFrame) -> Self {
        let lf = step(self.lazy());
        Self::deferred(self.label, lf)
    }

    pub fn schema(&self) -> FrameResult<SchemaRef> {
        match &self.state {
            FrameState::Materialized(df) => TableHandle::schema(df),
            FrameState::Deferred(lf) => TableHandle::schema(lf),
        }
    }

    pub fn column_names(&self) -> FrameResult<Vec<String>> {
        Ok(self
            .schema()?
            .iter_names()
            .map(|name| name.to_string())
            .collect())
    }

    pub fn has_column(&self, name: &str) -> FrameResult<bool> {
        Ok(self.schema()?.contains(name))
    }

    /// Requested columns the table lacks, in request order.
    pub fn missing_columns<S: AsRef<str>>(&self, columns: &[S]) -> FrameResult<Vec<String>> {
        let schema = self.schema()?;
        Ok(columns
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| !schema.contains(c))
            .map(str::to_string)
            .collect())
    }
}

impl TableHandle for TableFrame {
    fn schema(&self) -> FrameResult<SchemaRef> {
        TableFrame::schema(self)
    }

    fn to_lazy(&self) -> LazyFrame {
        self.lazy()
    }

    fn materialize(&self) -> FrameResult<DataFrame> {
        self.collect()
    }

    fn is_deferred(&self) -> bool {
        !self.is_materialized()
    }
}

impl fmt::Debug for TableFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("TableFrame");
        out.field("label", &self.label);
        match &self.state {
            FrameState::Materialized(df) => out.field("shape", &df.shape()),
            FrameState::Deferred(_) => out.field("deferred", &true),
        };
        out.finish()
    }
}

//! Lazily evaluated dataset transformations.
//!
//! An operator tree is built up front and evaluated once against a
//! [`LapisClient`]. Leaf operators call the backend; every other operator
//! owns its children and transforms their output into a fresh [`Dataset`].
//! The first error anywhere in the tree aborts the whole evaluation.

mod division;
mod fetch;
mod fill_missing;
mod group;
mod sliding;
mod transform;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::thread;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::domain::Row;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

pub use division::{DivisionOperator, Quotient};
pub use fetch::{
    FetchAggregatedOperator, FetchDetailsOperator, FetchInsertionsOperator,
    FetchMutationsOperator, FetchSubstitutionsOrDeletionsOperator, InsertionEntry, MutationEntry,
    SubstitutionOrDeletionEntry,
};
pub use fill_missing::FillMissingOperator;
pub use group::{GroupByAndSumOperator, GroupByOperator};
pub use sliding::SlidingWindowOperator;
pub use transform::{FilterMapOperator, MapOperator, RenameFieldOperator, SortOperator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset<T> {
    pub content: Vec<T>,
}

impl<T> Dataset<T> {
    pub fn new(content: Vec<T>) -> Self {
        Self { content }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl<T> From<Vec<T>> for Dataset<T> {
    fn from(content: Vec<T>) -> Self {
        Self { content }
    }
}

pub trait Operator: Send + Sync {
    type Item: Send;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Self::Item>, DashboardError>;
}

pub type BoxedOperator<T> = Box<dyn Operator<Item = T>>;

impl<O: Operator + ?Sized> Operator for Box<O> {
    type Item = O::Item;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Self::Item>, DashboardError> {
        (**self).evaluate(lapis, cancel)
    }
}

/// Builder-style combinators available on every operator.
pub trait OperatorExt: Operator + Sized {
    fn map<U, F>(self, transform: F) -> MapOperator<Self, F>
    where
        F: Fn(Self::Item) -> U + Send + Sync,
        U: Send,
    {
        MapOperator::new(self, transform)
    }

    fn filter_map<U, F>(self, transform: F) -> FilterMapOperator<Self, F>
    where
        F: Fn(Self::Item) -> Option<U> + Send + Sync,
        U: Send,
    {
        FilterMapOperator::new(self, transform)
    }

    fn sort_by<F>(self, compare: F) -> SortOperator<Self, F>
    where
        F: Fn(&Self::Item, &Self::Item) -> std::cmp::Ordering + Send + Sync,
    {
        SortOperator::new(self, compare)
    }

    fn sliding_window<U, F>(
        self,
        window_size: usize,
        aggregate: F,
    ) -> SlidingWindowOperator<Self, F>
    where
        F: Fn(&[Self::Item]) -> U + Send + Sync,
        U: Send,
    {
        SlidingWindowOperator::new(self, window_size, aggregate)
    }

    fn boxed(self) -> BoxedOperator<Self::Item>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<O: Operator> OperatorExt for O {}

/// A JSON field value usable as a grouping or join key. Two values are the
/// same key iff their compact JSON serialisations are equal.
#[derive(Debug, Clone)]
pub struct FieldValue(pub Value);

impl FieldValue {
    pub fn of(row: &Row, field: &str) -> Self {
        Self(row.get(field).cloned().unwrap_or(Value::Null))
    }

    pub fn serialized(&self) -> String {
        self.0.to_string()
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.serialized() == other.serialized()
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serialized().hash(state);
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

pub fn row_f64(row: &Row, field: &str) -> Result<f64, DashboardError> {
    row.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| DashboardError::FieldType {
            field: field.to_string(),
            message: format!("expected a number in {}", Value::Object(row.clone())),
        })
}

pub fn row_u64(row: &Row, field: &str) -> Result<u64, DashboardError> {
    row.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| DashboardError::FieldType {
            field: field.to_string(),
            message: format!("expected a non-negative integer in {}", Value::Object(row.clone())),
        })
}

pub fn row_str<'a>(row: &'a Row, field: &str) -> Result<&'a str, DashboardError> {
    row.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| DashboardError::FieldType {
            field: field.to_string(),
            message: format!("expected a string in {}", Value::Object(row.clone())),
        })
}

/// Runs two independent evaluations side by side and waits for both.
///
/// The first failure cancels the sibling through a shared child token, and
/// that failure (not the induced cancellation) is what gets reported.
pub(crate) fn evaluate_jointly<A, B, RA, RB>(
    cancel: &CancellationToken,
    left: A,
    right: B,
) -> Result<(RA, RB), DashboardError>
where
    A: FnOnce(&CancellationToken) -> Result<RA, DashboardError> + Send,
    B: FnOnce(&CancellationToken) -> Result<RB, DashboardError> + Send,
    RA: Send,
    RB: Send,
{
    let token = cancel.child();
    let (left_result, right_result) = thread::scope(|scope| {
        let right_token = token.clone();
        let handle = scope.spawn(move || {
            let result = right(&right_token);
            if result.is_err() {
                right_token.cancel();
            }
            result
        });
        let left_result = left(&token);
        if left_result.is_err() {
            token.cancel();
        }
        let right_result = match handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        (left_result, right_result)
    });

    match (left_result, right_result) {
        (Ok(left), Ok(right)) => Ok((left, right)),
        (Err(DashboardError::Cancelled), Err(err)) if !cancel.is_cancelled() => Err(err),
        (Err(err), _) => Err(err),
        (_, Err(err)) => Err(err),
    }
}

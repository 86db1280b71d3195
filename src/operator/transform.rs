use std::cmp::Ordering;

use super::{Dataset, Operator};
use crate::cancel::CancellationToken;
use crate::domain::Row;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

pub struct MapOperator<C, F> {
    child: C,
    transform: F,
}

impl<C, F> MapOperator<C, F> {
    pub fn new(child: C, transform: F) -> Self {
        Self { child, transform }
    }
}

impl<C, F, U> Operator for MapOperator<C, F>
where
    C: Operator,
    F: Fn(C::Item) -> U + Send + Sync,
    U: Send,
{
    type Item = U;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<U>, DashboardError> {
        let child = self.child.evaluate(lapis, cancel)?;
        Ok(Dataset::new(
            child.content.into_iter().map(&self.transform).collect(),
        ))
    }
}

type RowTransform = Box<dyn Fn(Row) -> Row + Send + Sync>;

/// Copies `from` into `to` on every row; `from` is kept. Rows without `from`
/// pass through unchanged.
pub struct RenameFieldOperator<C> {
    inner: MapOperator<C, RowTransform>,
}

impl<C> RenameFieldOperator<C>
where
    C: Operator<Item = Row>,
{
    pub fn new(child: C, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        let transform: RowTransform = Box::new(move |mut row: Row| {
            if let Some(value) = row.get(&from).cloned() {
                row.insert(to.clone(), value);
            }
            row
        });
        Self {
            inner: MapOperator::new(child, transform),
        }
    }
}

impl<C> Operator for RenameFieldOperator<C>
where
    C: Operator<Item = Row>,
{
    type Item = Row;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Row>, DashboardError> {
        self.inner.evaluate(lapis, cancel)
    }
}

/// Reorders the child's records with `compare`. Equal elements keep their
/// relative order (`slice::sort_by` is stable), but callers that care should
/// still break ties in the comparator.
pub struct SortOperator<C, F> {
    child: C,
    compare: F,
}

impl<C, F> SortOperator<C, F> {
    pub fn new(child: C, compare: F) -> Self {
        Self { child, compare }
    }
}

impl<C, F> Operator for SortOperator<C, F>
where
    C: Operator,
    F: Fn(&C::Item, &C::Item) -> Ordering + Send + Sync,
{
    type Item = C::Item;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<C::Item>, DashboardError> {
        let mut child = self.child.evaluate(lapis, cancel)?;
        child.content.sort_by(&self.compare);
        Ok(child)
    }
}

/// Keeps the records for which `transform` returns `Some`, in order.
pub struct FilterMapOperator<C, F> {
    child: C,
    transform: F,
}

impl<C, F> FilterMapOperator<C, F> {
    pub fn new(child: C, transform: F) -> Self {
        Self { child, transform }
    }
}

impl<C, F, U> Operator for FilterMapOperator<C, F>
where
    C: Operator,
    F: Fn(C::Item) -> Option<U> + Send + Sync,
    U: Send,
{
    type Item = U;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<U>, DashboardError> {
        let child = self.child.evaluate(lapis, cancel)?;
        Ok(Dataset::new(
            child.content.into_iter().filter_map(&self.transform).collect(),
        ))
    }
}

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

use super::{Dataset, FieldValue, Operator, evaluate_jointly, row_f64};
use crate::cancel::CancellationToken;
use crate::domain::Row;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quotient<K> {
    pub key: K,
    pub numerator: f64,
    pub denominator: f64,
    pub result: f64,
}

/// Divides numerator by denominator values matched on a shared key.
///
/// The denominator decides which keys appear: keys only present in the
/// numerator are dropped, and a missing numerator counts as 0. Division by
/// zero follows IEEE semantics (`inf` or `NaN`).
pub struct DivisionOperator<N, D, KF, VF> {
    numerator: N,
    denominator: D,
    key: KF,
    value: VF,
}

impl<N, D, KF, VF> DivisionOperator<N, D, KF, VF> {
    pub fn new(numerator: N, denominator: D, key: KF, value: VF) -> Self {
        Self {
            numerator,
            denominator,
            key,
            value,
        }
    }
}

type RowKeyFn = Box<dyn Fn(&Row) -> FieldValue + Send + Sync>;
type RowValueFn = Box<dyn Fn(&Row) -> Result<f64, DashboardError> + Send + Sync>;

impl<N, D> DivisionOperator<N, D, RowKeyFn, RowValueFn>
where
    N: Operator<Item = Row>,
    D: Operator<Item = Row>,
{
    /// Matches rows on `key_field` and divides their `value_field`.
    pub fn on_fields(
        numerator: N,
        denominator: D,
        key_field: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        let key_field = key_field.into();
        let value_field = value_field.into();
        Self::new(
            numerator,
            denominator,
            Box::new(move |row: &Row| FieldValue::of(row, &key_field)),
            Box::new(move |row: &Row| row_f64(row, &value_field)),
        )
    }
}

impl<N, D, K, KF, VF> Operator for DivisionOperator<N, D, KF, VF>
where
    N: Operator,
    D: Operator<Item = N::Item>,
    K: Hash + Eq + Send,
    KF: Fn(&N::Item) -> K + Send + Sync,
    VF: Fn(&N::Item) -> Result<f64, DashboardError> + Send + Sync,
{
    type Item = Quotient<K>;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Quotient<K>>, DashboardError> {
        let (numerator, denominator) = evaluate_jointly(
            cancel,
            |token| self.numerator.evaluate(lapis, token),
            |token| self.denominator.evaluate(lapis, token),
        )?;

        let mut numerator_values = HashMap::with_capacity(numerator.len());
        for record in &numerator.content {
            numerator_values.insert((self.key)(record), (self.value)(record)?);
        }

        let content = denominator
            .content
            .iter()
            .map(|record| {
                let key = (self.key)(record);
                let denominator = (self.value)(record)?;
                let numerator = numerator_values.get(&key).copied().unwrap_or(0.0);
                Ok(Quotient {
                    key,
                    numerator,
                    denominator,
                    result: numerator / denominator,
                })
            })
            .collect::<Result<Vec<_>, DashboardError>>()?;
        Ok(Dataset::new(content))
    }
}

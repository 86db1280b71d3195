use std::hash::Hash;

use indexmap::IndexMap;
use serde_json::{Number, Value};

use super::{Dataset, FieldValue, Operator};
use crate::cancel::CancellationToken;
use crate::domain::Row;
use crate::error::DashboardError;
use crate::lapis::LapisClient;

/// Partitions the child's records by key and aggregates each partition.
/// Groups are emitted in the order their key first appears.
pub struct GroupByOperator<C, KF, AF> {
    child: C,
    key: KF,
    aggregate: AF,
}

impl<C, KF, AF> GroupByOperator<C, KF, AF> {
    pub fn new(child: C, key: KF, aggregate: AF) -> Self {
        Self {
            child,
            key,
            aggregate,
        }
    }
}

impl<C, K, KF, AF, U> Operator for GroupByOperator<C, KF, AF>
where
    C: Operator,
    K: Hash + Eq,
    KF: Fn(&C::Item) -> K + Send + Sync,
    AF: Fn(&K, Vec<C::Item>) -> Result<U, DashboardError> + Send + Sync,
    U: Send,
{
    type Item = U;

    fn evaluate(
        &self,
        lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<U>, DashboardError> {
        let child = self.child.evaluate(lapis, cancel)?;
        let mut groups: IndexMap<K, Vec<C::Item>> = IndexMap::new();
        for record in child.content {
            groups.entry((self.key)(&record)).or_default().push(record);
        }
        let content = groups
            .into_iter()
            .map(|(key, records)| (self.aggregate)(&key, records))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Dataset::new(content))
    }
}

type GroupKeyFn = Box<dyn Fn(&Row) -> FieldValue + Send + Sync>;
type GroupSumFn = Box<dyn Fn(&FieldValue, Vec<Row>) -> Result<Row, DashboardError> + Send + Sync>;

/// Groups rows by `group_field` and sums `sum_field` per group. Each output
/// row holds exactly the group key and the sum, under the same field names.
pub struct GroupByAndSumOperator<C> {
    inner: GroupByOperator<C, GroupKeyFn, GroupSumFn>,
}

impl<C> GroupByAndSumOperator<C>
where
    C: Operator<Item = Row>,
{
    pub fn new(child: C, group_field: impl Into<String>, sum_field: impl Into<String>) -> Self {
        let group_field = group_field.into();
        let sum_field = sum_field.into();
        let key_field = group_field.clone();
        let key: GroupKeyFn = Box::new(move |row: &Row| FieldValue::of(row, &key_field));
        let aggregate: GroupSumFn = Box::new(move |key: &FieldValue, rows: Vec<Row>| {
            let sum = sum_field_values(&rows, &sum_field)?;
            let mut row = Row::new();
            row.insert(group_field.clone(), key.0.clone());
            row.insert(sum_field.clone(), sum);
            Ok(row)
        });
        Self {
            inner: GroupByOperator::new(child, key, aggregate),
        }
    }
}

impl<C> Operator for GroupByAndSumOperator<C>
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

/// Integer inputs give an integer sum; any fractional input makes it a float.
fn sum_field_values(rows: &[Row], field: &str) -> Result<Value, DashboardError> {
    let mut integer_sum: i64 = 0;
    let mut float_sum = 0.0;
    let mut all_integers = true;
    for row in rows {
        let value = row.get(field).ok_or_else(|| DashboardError::FieldType {
            field: field.to_string(),
            message: "missing from grouped row".to_string(),
        })?;
        match value.as_i64() {
            Some(number) if all_integers => {
                integer_sum = integer_sum.saturating_add(number);
                float_sum += number as f64;
            }
            _ => {
                let number = value.as_f64().ok_or_else(|| DashboardError::FieldType {
                    field: field.to_string(),
                    message: format!("cannot sum non-numeric value {value}"),
                })?;
                all_integers = false;
                float_sum += number;
            }
        }
    }
    if all_integers {
        return Ok(Value::from(integer_sum));
    }
    Number::from_f64(float_sum)
        .map(Value::Number)
        .ok_or_else(|| DashboardError::FieldType {
            field: field.to_string(),
            message: "sum is not finite".to_string(),
        })
}

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::QueryContext;
use crate::domain::{LapisFilter, Row};
use crate::error::DashboardError;
use crate::operator::{FetchAggregatedOperator, FetchDetailsOperator, Operator, OperatorExt, row_u64};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedEntry {
    #[serde(flatten)]
    pub fields: Row,
    pub count: u64,
    pub proportion: f64,
}

/// Counts per combination of `fields`, largest first, each with its share
/// of the total.
pub fn query_aggregated_data(
    ctx: &QueryContext<'_>,
    filter: &LapisFilter,
    fields: &[String],
) -> Result<Vec<AggregatedEntry>, DashboardError> {
    info!(?fields, "query aggregated data");
    let rows = FetchAggregatedOperator::new(filter.clone(), fields.to_vec())
        .evaluate(ctx.lapis, &ctx.cancel)?
        .content;

    let mut entries = rows
        .into_iter()
        .map(|mut row| {
            let count = row_u64(&row, "count")?;
            row.remove("count");
            Ok((row, count))
        })
        .collect::<Result<Vec<_>, DashboardError>>()?;
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let total: u64 = entries.iter().map(|(_, count)| count).sum();
    Ok(entries
        .into_iter()
        .map(|(fields, count)| AggregatedEntry {
            fields,
            count,
            proportion: if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            },
        })
        .collect())
}

/// Detail rows, ordered ascending by `order_by` when given. Rows lacking the
/// field sort last.
pub fn query_sequence_details(
    ctx: &QueryContext<'_>,
    filter: &LapisFilter,
    fields: &[String],
    order_by: Option<&str>,
) -> Result<Vec<Row>, DashboardError> {
    info!(?fields, order_by, "query sequence details");
    let fetch = FetchDetailsOperator::new(filter.clone(), fields.to_vec());
    let dataset = match order_by {
        Some(field) => {
            let field = field.to_string();
            fetch
                .sort_by(move |a: &Row, b: &Row| compare_values(a.get(&field), b.get(&field)))
                .evaluate(ctx.lapis, &ctx.cancel)?
        }
        None => fetch.evaluate(ctx.lapis, &ctx.cancel)?,
    };
    Ok(dataset.content)
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

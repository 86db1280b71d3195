use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::QueryContext;
use crate::domain::{Granularity, LapisFilter, NamedFilter, Row};
use crate::error::DashboardError;
use crate::operator::{
    DivisionOperator, FetchAggregatedOperator, FillMissingOperator, GroupByAndSumOperator,
    Operator, OperatorExt, Quotient, RenameFieldOperator,
};
use crate::temporal::{Temporal, TemporalCache, generate_range, min_max};

const DATE: &str = "date";
const COUNT: &str = "count";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateCount {
    pub date: Temporal,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberOfSequencesOverTime {
    pub display_name: String,
    pub content: Vec<DateCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrevalenceEntry {
    pub date: Temporal,
    pub prevalence: f64,
    pub count: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrevalenceOverTime {
    pub display_name: String,
    pub content: Vec<PrevalenceEntry>,
}

/// Sequence counts per `granularity` unit, gap-filled with zero counts
/// between the first and last observed unit and sorted by date. Rows
/// without a usable date are dropped.
pub(crate) fn counts_over_time<'a>(
    filter: LapisFilter,
    granularity: Granularity,
    date_field: &str,
    cache: &'a TemporalCache,
) -> impl Operator<Item = DateCount> + 'a {
    let fetch = FetchAggregatedOperator::new(filter, vec![date_field.to_string()]);
    let projected = RenameFieldOperator::new(fetch, date_field, DATE).map(move |mut row: Row| {
        let unit = row
            .get(DATE)
            .and_then(Value::as_str)
            .and_then(|day| match cache.from_date_string(day, granularity) {
                Ok(unit) => Some(unit),
                Err(err) => {
                    warn!(%err, "dropping row with unusable date");
                    None
                }
            });
        let value = unit.map(|unit| Value::from(unit.text())).unwrap_or(Value::Null);
        row.insert(DATE.to_string(), value);
        row
    });

    let typed = GroupByAndSumOperator::new(projected, DATE, COUNT).filter_map(move |row: Row| {
        let date = cache.parse(row.get(DATE)?.as_str()?, granularity).ok()?;
        let count = row.get(COUNT)?.as_f64()?;
        Some(DateCount { date, count })
    });

    FillMissingOperator::new(
        typed,
        |record: &DateCount| record.date.clone(),
        |dates: &[Temporal]| min_max(dates),
        move |min: &Temporal, max: &Temporal| generate_range(cache, min, max),
        |date: &Temporal| DateCount {
            date: date.clone(),
            count: 0.0,
        },
    )
    .sort_by(|a: &DateCount, b: &DateCount| a.date.cmp(&b.date))
}

/// Centred moving average; the window's middle record supplies the date.
fn smoothed<'a, O>(series: O, window_size: usize) -> impl Operator<Item = DateCount> + 'a
where
    O: Operator<Item = DateCount> + 'a,
{
    series
        .sliding_window(window_size, |window: &[DateCount]| {
            let middle = window.get(window.len() / 2)?;
            let total: f64 = window.iter().map(|record| record.count).sum();
            Some(DateCount {
                date: middle.date.clone(),
                count: total / window.len() as f64,
            })
        })
        .filter_map(|record: Option<DateCount>| record)
}

pub fn query_number_of_sequences_over_time(
    ctx: &QueryContext<'_>,
    filters: &[NamedFilter],
    granularity: Granularity,
    smoothing_window: usize,
    date_field: &str,
) -> Result<Vec<NumberOfSequencesOverTime>, DashboardError> {
    info!(variants = filters.len(), %granularity, "query number of sequences over time");
    filters
        .iter()
        .map(|named| {
            let series = smoothed(
                counts_over_time(
                    named.lapis_filter.clone(),
                    granularity,
                    date_field,
                    ctx.cache,
                ),
                smoothing_window,
            );
            let dataset = series.evaluate(ctx.lapis, &ctx.cancel)?;
            Ok(NumberOfSequencesOverTime {
                display_name: named.display_name.clone(),
                content: dataset.content,
            })
        })
        .collect()
}

pub fn query_prevalence_over_time(
    ctx: &QueryContext<'_>,
    numerators: &[NamedFilter],
    denominator: &LapisFilter,
    granularity: Granularity,
    smoothing_window: usize,
    date_field: &str,
) -> Result<Vec<PrevalenceOverTime>, DashboardError> {
    info!(variants = numerators.len(), %granularity, smoothing_window, "query prevalence over time");
    let result = numerators
        .iter()
        .map(|named| {
            let numerator = smoothed(
                counts_over_time(
                    named.lapis_filter.clone(),
                    granularity,
                    date_field,
                    ctx.cache,
                ),
                smoothing_window,
            );
            let total = smoothed(
                counts_over_time(denominator.clone(), granularity, date_field, ctx.cache),
                smoothing_window,
            );
            let prevalence = DivisionOperator::new(
                numerator,
                total,
                |record: &DateCount| record.date.clone(),
                |record: &DateCount| Ok::<f64, DashboardError>(record.count),
            )
            .map(|quotient: Quotient<Temporal>| PrevalenceEntry {
                date: quotient.key,
                prevalence: quotient.result,
                count: quotient.numerator,
                total: quotient.denominator,
            })
            .sort_by(|a: &PrevalenceEntry, b: &PrevalenceEntry| a.date.cmp(&b.date));

            let dataset = prevalence.evaluate(ctx.lapis, &ctx.cancel)?;
            Ok(PrevalenceOverTime {
                display_name: named.display_name.clone(),
                content: dataset.content,
            })
        })
        .collect::<Result<Vec<_>, DashboardError>>()?;
    info!(variants = result.len(), "prevalence over time done");
    Ok(result)
}

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, info};

use super::QueryContext;
use super::series::{DateCount, counts_over_time};
use crate::domain::{Granularity, LapisFilter, SequenceType};
use crate::error::DashboardError;
use crate::map2d::{Map2d, Map2dBase};
use crate::mutation::{Mutation, MutationParseCache, SubstitutionOrDeletion, compare_mutations};
use crate::operator::{
    Dataset, FetchSubstitutionsOrDeletionsOperator, Operator, OperatorExt,
    SubstitutionOrDeletionEntry,
};
use crate::temporal::{Temporal, date_range_filter};

/// Threshold for the per-date fetches; rows are chosen by the overall
/// threshold, columns only need to report whatever is present.
pub const COLUMN_MIN_PROPORTION: f64 = 0.001;

const PARALLEL_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProportionAndCount {
    pub proportion: f64,
    pub count: u64,
    pub total_count: u64,
}

impl ProportionAndCount {
    pub fn empty(total_count: u64) -> Self {
        Self {
            proportion: 0.0,
            count: 0,
            total_count,
        }
    }
}

pub type MutationOverTimeData = Map2dBase<SubstitutionOrDeletion, Temporal, ProportionAndCount>;

#[derive(Debug, Clone)]
pub struct MutationsOverTimeRequest {
    pub filter: LapisFilter,
    pub sequence_type: SequenceType,
    pub granularity: Granularity,
    pub date_field: String,
    pub min_proportion: f64,
    pub max_columns: usize,
}

/// Mutations above `min_proportion` in the whole filter (rows) against every
/// date unit in the filter's range (columns).
pub fn query_mutations_over_time(
    ctx: &QueryContext<'_>,
    request: &MutationsOverTimeRequest,
) -> Result<MutationOverTimeData, DashboardError> {
    info!(
        sequence_type = %request.sequence_type,
        granularity = %request.granularity,
        min_proportion = request.min_proportion,
        "query mutations over time"
    );
    let dates = counts_over_time(
        request.filter.clone(),
        request.granularity,
        &request.date_field,
        ctx.cache,
    )
    .evaluate(ctx.lapis, &ctx.cancel)?
    .content;

    if dates.len() > request.max_columns {
        return Err(DashboardError::user_facing(
            "Too many dates",
            format!(
                "the selected range covers {} {}s but at most {} columns can be shown; \
                 choose a coarser granularity or a shorter date range",
                dates.len(),
                request.granularity,
                request.max_columns
            ),
        ));
    }

    let parse_cache = Arc::new(MutationParseCache::new());
    let overall = FetchSubstitutionsOrDeletionsOperator::new(
        request.filter.clone(),
        request.sequence_type,
        request.min_proportion,
    )
    .with_parse_cache(parse_cache.clone())
    .sort_by(|a: &SubstitutionOrDeletionEntry, b: &SubstitutionOrDeletionEntry| {
        compare_mutations(
            &Mutation::from(a.mutation.clone()),
            &Mutation::from(b.mutation.clone()),
        )
    })
    .evaluate(ctx.lapis, &ctx.cancel)?
    .content;

    let columns = fetch_columns(ctx, request, &dates, &parse_cache)?;

    let mut data: MutationOverTimeData = Map2dBase::new(
        |mutation: &SubstitutionOrDeletion| mutation.code(),
        |date: &Temporal| date.text().to_string(),
    );
    for date in &dates {
        data.add_second_axis_key(date.date.clone());
    }
    for (date, column) in dates.iter().zip(columns) {
        let total_count = date.count.round() as u64;
        let by_code = column
            .iter()
            .map(|entry| (entry.mutation.code(), entry))
            .collect::<HashMap<_, _>>();
        for entry in &overall {
            let cell = match by_code.get(&entry.mutation.code()) {
                Some(found) => ProportionAndCount {
                    proportion: found.proportion,
                    count: found.count,
                    total_count,
                },
                None => ProportionAndCount::empty(total_count),
            };
            data.set(entry.mutation.clone(), date.date.clone(), cell)?;
        }
    }
    info!(
        mutations = overall.len(),
        dates = dates.len(),
        "mutations over time done"
    );
    Ok(data)
}

/// One mutation fetch per date unit, run in bounded batches. Units without
/// sequences are not fetched.
fn fetch_columns(
    ctx: &QueryContext<'_>,
    request: &MutationsOverTimeRequest,
    dates: &[DateCount],
    parse_cache: &Arc<MutationParseCache>,
) -> Result<Vec<Vec<SubstitutionOrDeletionEntry>>, DashboardError> {
    let lapis = ctx.lapis;
    let mut columns = Vec::with_capacity(dates.len());
    for batch in dates.chunks(PARALLEL_COLUMNS) {
        ctx.cancel.check()?;
        debug!(size = batch.len(), "fetching mutation columns");
        let batch_token = ctx.cancel.child();
        let results = thread::scope(|scope| {
            let handles = batch
                .iter()
                .map(|date| {
                    let token = batch_token.clone();
                    let filter = request
                        .filter
                        .merged(&date_range_filter(&request.date_field, &date.date));
                    let operator = FetchSubstitutionsOrDeletionsOperator::new(
                        filter,
                        request.sequence_type,
                        COLUMN_MIN_PROPORTION,
                    )
                    .with_parse_cache(parse_cache.clone());
                    let has_sequences = date.count > 0.0;
                    scope.spawn(move || {
                        if !has_sequences {
                            return Ok(Dataset::new(Vec::new()));
                        }
                        let result = operator.evaluate(lapis, &token);
                        if result.is_err() {
                            token.cancel();
                        }
                        result
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        });

        let mut first_error: Option<DashboardError> = None;
        for result in results {
            match result {
                Ok(dataset) => columns.push(dataset.content),
                Err(err) => {
                    let replace = match &first_error {
                        None => true,
                        Some(DashboardError::Cancelled) => !matches!(err, DashboardError::Cancelled),
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
    }
    Ok(columns)
}

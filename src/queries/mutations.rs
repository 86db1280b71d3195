use std::sync::Arc;

use tracing::info;

use super::QueryContext;
use crate::domain::{LapisFilter, SequenceType};
use crate::error::DashboardError;
use crate::mutation::{MutationParseCache, compare_mutations};
use crate::operator::{FetchMutationsOperator, MutationEntry, Operator, OperatorExt};

/// All substitutions, deletions and insertions above `min_proportion`,
/// ordered by segment and position.
pub fn query_mutations(
    ctx: &QueryContext<'_>,
    filter: &LapisFilter,
    sequence_type: SequenceType,
    min_proportion: f64,
) -> Result<Vec<MutationEntry>, DashboardError> {
    info!(%sequence_type, min_proportion, "query mutations");
    let parse_cache = Arc::new(MutationParseCache::new());
    let operator = FetchMutationsOperator::new(filter.clone(), sequence_type, min_proportion)
        .with_parse_cache(parse_cache)
        .sort_by(|a: &MutationEntry, b: &MutationEntry| {
            compare_mutations(&a.mutation(), &b.mutation())
        });
    Ok(operator.evaluate(ctx.lapis, &ctx.cancel)?.content)
}

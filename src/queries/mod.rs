//! Pre-built operator trees consumed by the dashboard views.

mod aggregated;
mod mutations;
mod mutations_over_time;
mod relative_growth_advantage;
mod series;

use crate::cancel::CancellationToken;
use crate::lapis::LapisClient;
use crate::temporal::TemporalCache;

pub use aggregated::{AggregatedEntry, query_aggregated_data, query_sequence_details};
pub use mutations::query_mutations;
pub use mutations_over_time::{
    MutationOverTimeData, MutationsOverTimeRequest, ProportionAndCount, query_mutations_over_time,
};
pub use relative_growth_advantage::{
    DEFAULT_GROWTH_MODEL_URL, Estimate, EstimatedProportion, EstimatedProportionSeries,
    GrowthModelClient, GrowthModelData, GrowthModelHttpClient, GrowthModelParams,
    GrowthModelRequest, GrowthModelResponse, ObservedProportion, RelativeGrowthAdvantage,
    query_relative_growth_advantage,
};
pub use series::{
    DateCount, NumberOfSequencesOverTime, PrevalenceEntry, PrevalenceOverTime,
    query_number_of_sequences_over_time, query_prevalence_over_time,
};

/// Everything a query needs besides its own parameters.
pub struct QueryContext<'a> {
    pub lapis: &'a dyn LapisClient,
    pub cache: &'a TemporalCache,
    pub cancel: CancellationToken,
}

impl<'a> QueryContext<'a> {
    pub fn new(lapis: &'a dyn LapisClient, cache: &'a TemporalCache) -> Self {
        Self {
            lapis,
            cache,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

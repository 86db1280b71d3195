use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::QueryContext;
use super::series::{DateCount, counts_over_time};
use crate::cancel::CancellationToken;
use crate::domain::{Granularity, LapisFilter};
use crate::error::DashboardError;
use crate::lapis::{Failure, default_headers, send_json_with_retries};
use crate::operator::{DivisionOperator, Operator, OperatorExt, Quotient};
use crate::temporal::Temporal;

pub const DEFAULT_GROWTH_MODEL_URL: &str =
    "https://cov-spectrum.org/api/v2/computed/model/chen2021Fitness";

const CONFIDENCE_LEVEL: f64 = 0.95;
const REPRODUCTION_NUMBER_WILDTYPE: f64 = 1.0;

/// Daily observations, `t` counted in days from the first observed day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthModelData {
    pub t: Vec<i64>,
    pub n: Vec<u64>,
    pub k: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthModelRequest {
    pub data: GrowthModelData,
    pub alpha: f64,
    pub generation_time: f64,
    pub reproduction_number_wildtype: f64,
    pub t_start: i64,
    pub t_end: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedProportionSeries {
    pub t: Vec<i64>,
    pub proportion: Vec<f64>,
    pub ci_lower: Vec<f64>,
    pub ci_upper: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GrowthModelParams {
    pub fd: Estimate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthModelResponse {
    pub estimated_proportions: EstimatedProportionSeries,
    pub params: GrowthModelParams,
}

/// External fitness model fitted to a daily proportion series.
pub trait GrowthModelClient: Send + Sync {
    fn fit(
        &self,
        request: &GrowthModelRequest,
        cancel: &CancellationToken,
    ) -> Result<GrowthModelResponse, DashboardError>;
}

#[derive(Clone)]
pub struct GrowthModelHttpClient {
    client: Client,
    url: String,
}

impl GrowthModelHttpClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DashboardError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(timeout)
            .build()
            .map_err(|err| DashboardError::GrowthModelHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl GrowthModelClient for GrowthModelHttpClient {
    fn fit(
        &self,
        request: &GrowthModelRequest,
        cancel: &CancellationToken,
    ) -> Result<GrowthModelResponse, DashboardError> {
        debug!(url = %self.url, points = request.data.t.len(), "growth model request");
        let value = send_json_with_retries(|| self.client.post(&self.url).json(request), cancel)?
            .map_err(|failure| match failure {
                Failure::Status { status, message } => {
                    DashboardError::GrowthModelStatus { status, message }
                }
                Failure::Transport(message) => DashboardError::GrowthModelHttp(message),
                Failure::Decode(message) => DashboardError::MalformedResponse(message),
            })?;
        serde_json::from_value(value)
            .map_err(|err| DashboardError::MalformedResponse(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedProportion {
    pub date: Temporal,
    pub proportion: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedProportion {
    pub date: Temporal,
    pub proportion: f64,
    pub count: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeGrowthAdvantage {
    pub relative_advantage: f64,
    pub lower: f64,
    pub upper: f64,
    pub estimated_proportions: Vec<EstimatedProportion>,
    pub observed: Vec<ObservedProportion>,
}

/// Fits the growth model to the daily share of `numerator` in `denominator`.
/// Returns `None` when no day has any denominator sequences.
pub fn query_relative_growth_advantage(
    ctx: &QueryContext<'_>,
    numerator: &LapisFilter,
    denominator: &LapisFilter,
    generation_time: f64,
    date_field: &str,
    model: &dyn GrowthModelClient,
) -> Result<Option<RelativeGrowthAdvantage>, DashboardError> {
    info!(generation_time, "query relative growth advantage");
    let daily = DivisionOperator::new(
        counts_over_time(numerator.clone(), Granularity::Day, date_field, ctx.cache),
        counts_over_time(denominator.clone(), Granularity::Day, date_field, ctx.cache),
        |record: &DateCount| record.date.clone(),
        |record: &DateCount| Ok::<f64, DashboardError>(record.count),
    )
    .filter_map(|quotient: Quotient<Temporal>| (quotient.denominator > 0.0).then_some(quotient))
    .sort_by(|a: &Quotient<Temporal>, b: &Quotient<Temporal>| a.key.cmp(&b.key))
    .evaluate(ctx.lapis, &ctx.cancel)?
    .content;

    let Some(first) = daily.first().map(|quotient| quotient.key.clone()) else {
        info!("no sequences in the denominator, skipping growth model");
        return Ok(None);
    };

    let mut data = GrowthModelData {
        t: Vec::with_capacity(daily.len()),
        n: Vec::with_capacity(daily.len()),
        k: Vec::with_capacity(daily.len()),
    };
    let mut observed = Vec::with_capacity(daily.len());
    for quotient in &daily {
        let count = quotient.numerator.round() as u64;
        let total = quotient.denominator.round() as u64;
        data.t.push(quotient.key.difference(&first)?);
        data.n.push(total);
        data.k.push(count);
        observed.push(ObservedProportion {
            date: quotient.key.clone(),
            proportion: quotient.result,
            count,
            total,
        });
    }

    let request = GrowthModelRequest {
        t_start: data.t.first().copied().unwrap_or(0),
        t_end: data.t.last().copied().unwrap_or(0),
        data,
        alpha: CONFIDENCE_LEVEL,
        generation_time,
        reproduction_number_wildtype: REPRODUCTION_NUMBER_WILDTYPE,
    };
    let response = model.fit(&request, &ctx.cancel)?;

    let series = &response.estimated_proportions;
    let estimated_proportions = series
        .t
        .iter()
        .zip(&series.proportion)
        .zip(series.ci_lower.iter().zip(&series.ci_upper))
        .map(|((t, proportion), (ci_lower, ci_upper))| {
            Ok(EstimatedProportion {
                date: first.add(ctx.cache, *t)?,
                proportion: *proportion,
                ci_lower: *ci_lower,
                ci_upper: *ci_upper,
            })
        })
        .collect::<Result<Vec<_>, DashboardError>>()?;

    let fd = response.params.fd;
    info!(relative_advantage = fd.value, "relative growth advantage done");
    Ok(Some(RelativeGrowthAdvantage {
        relative_advantage: fd.value,
        lower: fd.ci_lower,
        upper: fd.ci_upper,
        estimated_proportions,
        observed,
    }))
}

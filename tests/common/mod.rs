#![allow(dead_code)]

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use genomic_dashboard_core::cancel::CancellationToken;
use genomic_dashboard_core::domain::{LapisFilter, Row, SequenceType};
use genomic_dashboard_core::error::DashboardError;
use genomic_dashboard_core::lapis::LapisClient;
use genomic_dashboard_core::operator::{Dataset, Operator};

pub type Handler =
    Box<dyn Fn(&LapisFilter, &CancellationToken) -> Result<Vec<Row>, DashboardError> + Send + Sync>;

/// In-memory backend. Every endpoint answers through its handler; calls are
/// recorded as `endpoint filter-json` lines.
pub struct MockLapis {
    aggregated: Handler,
    details: Handler,
    mutations: Handler,
    insertions: Handler,
    pub calls: Mutex<Vec<String>>,
}

impl MockLapis {
    pub fn new() -> Self {
        Self {
            aggregated: empty(),
            details: empty(),
            mutations: empty(),
            insertions: empty(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_aggregated<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LapisFilter, &CancellationToken) -> Result<Vec<Row>, DashboardError>
            + Send
            + Sync
            + 'static,
    {
        self.aggregated = Box::new(handler);
        self
    }

    pub fn with_details<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LapisFilter, &CancellationToken) -> Result<Vec<Row>, DashboardError>
            + Send
            + Sync
            + 'static,
    {
        self.details = Box::new(handler);
        self
    }

    pub fn with_mutations<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LapisFilter, &CancellationToken) -> Result<Vec<Row>, DashboardError>
            + Send
            + Sync
            + 'static,
    {
        self.mutations = Box::new(handler);
        self
    }

    pub fn with_insertions<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LapisFilter, &CancellationToken) -> Result<Vec<Row>, DashboardError>
            + Send
            + Sync
            + 'static,
    {
        self.insertions = Box::new(handler);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, endpoint: String, filter: &LapisFilter) {
        let filter = serde_json::to_string(filter).unwrap();
        self.calls.lock().unwrap().push(format!("{endpoint} {filter}"));
    }
}

impl LapisClient for MockLapis {
    fn aggregated(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        cancel.check()?;
        self.record(format!("aggregated[{}]", fields.join(",")), filter);
        (self.aggregated)(filter, cancel)
    }

    fn details(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        cancel.check()?;
        self.record(format!("details[{}]", fields.join(",")), filter);
        (self.details)(filter, cancel)
    }

    fn mutations(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        min_proportion: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        cancel.check()?;
        self.record(format!("mutations[{sequence_type},{min_proportion}]"), filter);
        (self.mutations)(filter, cancel)
    }

    fn insertions(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        cancel.check()?;
        self.record(format!("insertions[{sequence_type}]"), filter);
        (self.insertions)(filter, cancel)
    }
}

fn empty() -> Handler {
    Box::new(|_, _| Ok(Vec::new()))
}

/// Rows from a JSON array literal.
pub fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(row) => row,
                other => panic!("not an object: {other}"),
            })
            .collect(),
        other => panic!("not an array: {other}"),
    }
}

/// Blocks until `cancel` fires, giving up after two seconds.
pub fn wait_for_cancellation(cancel: &CancellationToken) -> Result<Vec<Row>, DashboardError> {
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(2) {
        cancel.check()?;
        thread::sleep(Duration::from_millis(5));
    }
    Ok(Vec::new())
}

/// Leaf operator yielding fixed rows.
pub struct StaticRows(pub Vec<Row>);

impl Operator for StaticRows {
    type Item = Row;

    fn evaluate(
        &self,
        _lapis: &dyn LapisClient,
        cancel: &CancellationToken,
    ) -> Result<Dataset<Row>, DashboardError> {
        cancel.check()?;
        Ok(Dataset::new(self.0.clone()))
    }
}

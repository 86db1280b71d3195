use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DashboardError;

/// A single record as returned by LAPIS: field name to JSON value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SequenceType {
    Nucleotide,
    AminoAcid,
}

impl SequenceType {
    pub fn endpoint_prefix(&self) -> &'static str {
        match self {
            SequenceType::Nucleotide => "nucleotide",
            SequenceType::AminoAcid => "aminoAcid",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Nucleotide => write!(f, "nucleotide"),
            SequenceType::AminoAcid => write!(f, "amino-acid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
    Year,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Granularity {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(DashboardError::InvalidTemporal(format!(
                "unknown granularity {other}"
            ))),
        }
    }
}

/// Filter object sent verbatim to every LAPIS endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LapisFilter(BTreeMap<String, Value>);

impl LapisFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this filter with `other` layered on top.
    pub fn merged(&self, other: &LapisFilter) -> LapisFilter {
        let mut merged = self.clone();
        for (key, value) in &other.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Parses `key=value`; finite numbers and booleans keep their JSON type.
    pub fn parse_assignment(input: &str) -> Result<(String, Value), DashboardError> {
        let (key, raw) = input
            .split_once('=')
            .ok_or_else(|| DashboardError::InvalidFilter(input.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DashboardError::InvalidFilter(input.to_string()));
        }
        let raw = raw.trim();
        let value = if let Ok(number) = raw.parse::<i64>() {
            Value::from(number)
        } else if let Some(number) = raw.parse::<f64>().ok().filter(|number| number.is_finite()) {
            Value::from(number)
        } else if let Ok(flag) = raw.parse::<bool>() {
            Value::from(flag)
        } else {
            Value::from(raw)
        };
        Ok((key.to_string(), value))
    }
}

impl FromStr for LapisFilter {
    type Err = DashboardError;

    /// Comma separated `key=value` pairs.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut filter = LapisFilter::new();
        for part in value.split(',').filter(|part| !part.trim().is_empty()) {
            let (key, value) = LapisFilter::parse_assignment(part)?;
            filter.insert(key, value);
        }
        Ok(filter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedFilter {
    pub display_name: String,
    pub lapis_filter: LapisFilter,
}

impl NamedFilter {
    pub fn new(display_name: impl Into<String>, lapis_filter: LapisFilter) -> Self {
        Self {
            display_name: display_name.into(),
            lapis_filter,
        }
    }
}

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DashboardError {
    #[error("invalid mutation code: {0}")]
    InvalidMutationCode(String),

    #[error("unexpected mutation type for {code}: expected {expected}")]
    UnexpectedMutationType { code: String, expected: String },

    #[error("aggregated response entry has no numeric count field: {0}")]
    MissingCount(String),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("field {field} has an unexpected value: {message}")]
    FieldType { field: String, message: String },

    #[error("invalid temporal value: {0}")]
    InvalidTemporal(String),

    #[error("cannot compare {left} with {right}: granularities differ")]
    GranularityMismatch { left: String, right: String },

    #[error("sliding window size must be at least 1, got {0}")]
    InvalidWindowSize(usize),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("views are read-only, cannot set a value")]
    ReadOnlyView,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("LAPIS request failed: {0}")]
    LapisHttp(String),

    #[error("LAPIS returned status {status}: {message}")]
    LapisStatus { status: u16, message: String },

    #[error("growth model request failed: {0}")]
    GrowthModelHttp(String),

    #[error("growth model returned status {status}: {message}")]
    GrowthModelStatus { status: u16, message: String },

    #[error("{headline}: {message}")]
    UserFacing { headline: String, message: String },

    #[error("missing config file dashboard.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),
}

impl DashboardError {
    pub fn user_facing(headline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UserFacing {
            headline: headline.into(),
            message: message.into(),
        }
    }

    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::UserFacing { .. })
    }

    /// Short title suitable for an error banner; `None` for raw failures.
    pub fn headline(&self) -> Option<&str> {
        match self {
            Self::UserFacing { headline, .. } => Some(headline),
            _ => None,
        }
    }
}

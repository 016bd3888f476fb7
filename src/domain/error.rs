//! Domain error types.

use chrono::NaiveDate;
use std::fmt;

/// Top-level error type for causalfolio.
#[derive(Debug, thiserror::Error)]
pub enum CausalError {
    #[error("alignment failed: {reason}")]
    Alignment { reason: String },

    #[error("estimation failed: {reason}")]
    Estimation { reason: String },

    #[error("degenerate weights: {reason}")]
    DegenerateWeights { reason: String },

    #[error("optimization failed: {reason}")]
    Optimization { reason: String },

    #[error("dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unsupported file format: {path}")]
    UnsupportedFormat { path: String },

    #[error("missing required columns: {}", missing.join(", "))]
    SchemaValidation { missing: Vec<String> },

    #[error("missing value in column {column} at {date}")]
    MissingValue { column: String, date: NaiveDate },

    #[error("invalid panel: {reason}")]
    InvalidPanel { reason: String },

    #[error("no data for {series}")]
    NoData { series: String },

    #[error("failed to retrieve {series}: {reason}")]
    DataSource { series: String, reason: String },

    #[error("malformed data for {series}: {reason}")]
    MalformedData { series: String, reason: String },

    #[error("failed to persist {name}: {reason}")]
    Persistence { name: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CausalError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        CausalError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Pipeline stage in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Returns,
    Align,
    Stationarity,
    Estimate,
    CausalWeights,
    MarkowitzWeights,
    Backtest,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Returns => "returns",
            Stage::Align => "align",
            Stage::Stationarity => "stationarity",
            Stage::Estimate => "estimate",
            Stage::CausalWeights => "causal-weights",
            Stage::MarkowitzWeights => "markowitz-weights",
            Stage::Backtest => "backtest",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A [`CausalError`] tagged with the stage that raised it.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: CausalError,
}

/// Attach a stage to a `Result<_, CausalError>`.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> AtStage<T> for Result<T, CausalError> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError { stage, source })
    }
}

impl From<&CausalError> for std::process::ExitCode {
    fn from(err: &CausalError) -> Self {
        let code: u8 = match err {
            CausalError::Io(_) | CausalError::Csv(_) | CausalError::Persistence { .. } => 1,
            CausalError::ConfigParse { .. }
            | CausalError::ConfigMissing { .. }
            | CausalError::ConfigInvalid { .. } => 2,
            CausalError::NoData { .. }
            | CausalError::DataSource { .. }
            | CausalError::MalformedData { .. } => 3,
            CausalError::UnsupportedFormat { .. } | CausalError::SchemaValidation { .. } => 4,
            CausalError::Alignment { .. }
            | CausalError::InvalidPanel { .. }
            | CausalError::MissingValue { .. } => 5,
            CausalError::Estimation { .. } => 6,
            CausalError::DegenerateWeights { .. } | CausalError::Optimization { .. } => 7,
            CausalError::DimensionMismatch { .. } => 8,
        };
        std::process::ExitCode::from(code)
    }
}

impl From<&PipelineError> for std::process::ExitCode {
    fn from(err: &PipelineError) -> Self {
        (&err.source).into()
    }
}

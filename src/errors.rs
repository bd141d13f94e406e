use polars::prelude::PolarsError;
use thiserror::Error;

/// Machine-readable error kind. Every [`ZoneError`] maps to exactly one kind
/// so hosts can branch on failure class without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Indicator,
    FeatureExtraction,
    Cache,
    Internal,
}

#[derive(Debug, Error)]
pub enum ZoneError {
    /// Missing rule keys, invalid threshold ordering, unknown strategy names,
    /// unsupported file extensions, non-serializable configs requested for caching.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing columns, empty input, malformed external zone rows.
    #[error("data error: {0}")]
    Data(String),

    /// The external indicator producer failed or returned misaligned columns.
    #[error("indicator error: {0}")]
    Indicator(String),

    /// A sub-strategy failed on a specific zone. Callers catch this, record it,
    /// and continue with the remaining metrics.
    #[error("feature extraction error: {0}")]
    FeatureExtraction(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl ZoneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZoneError::Configuration(_) => ErrorKind::Configuration,
            ZoneError::Data(_) => ErrorKind::Data,
            ZoneError::Indicator(_) => ErrorKind::Indicator,
            ZoneError::FeatureExtraction(_) => ErrorKind::FeatureExtraction,
            ZoneError::Cache(_) => ErrorKind::Cache,
            ZoneError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Data error for a missing column, listing what is actually available.
    pub fn missing_column(column: &str, available: &[String]) -> Self {
        ZoneError::Data(format!(
            "column '{column}' not found in data. Available: {}",
            available.join(", ")
        ))
    }

    /// Configuration error for missing rule keys on a named strategy.
    pub fn missing_rules(strategy: &str, missing: &[&str]) -> Self {
        ZoneError::Configuration(format!(
            "missing required rules for '{strategy}': {}",
            missing.join(", ")
        ))
    }
}

impl From<PolarsError> for ZoneError {
    fn from(err: PolarsError) -> Self {
        ZoneError::Data(err.to_string())
    }
}

//! Indicator production: the factory boundary between the engine and
//! indicator math.
//!
//! The engine never introspects indicator semantics; it only joins the
//! returned columns into its working copy of the table.

pub mod custom;
pub mod library;

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::errors::ZoneError;

/// Where an indicator comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorSource {
    /// Columns are already present in the input table.
    Preloaded,
    /// Built-in implementations shipped with this crate.
    Custom,
    /// The discoverable indicator library catalog (rust_ti backed).
    Library,
}

/// Configuration of one indicator to realize before detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub source: IndicatorSource,
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl IndicatorConfig {
    pub fn new(source: IndicatorSource, name: &str) -> Self {
        Self {
            source,
            name: name.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn param_or(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Named numeric columns aligned 1:1 to input rows.
#[derive(Debug, Clone)]
pub struct IndicatorResult {
    pub data: DataFrame,
    pub columns: Vec<String>,
}

impl IndicatorResult {
    pub fn empty() -> Self {
        Self {
            data: DataFrame::empty(),
            columns: Vec::new(),
        }
    }
}

pub trait Indicator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError>;
}

/// Process-wide entry point: `create(source, name, params)` returns a ready
/// indicator or a configuration/indicator error.
pub struct IndicatorFactory;

impl IndicatorFactory {
    pub fn create(config: &IndicatorConfig) -> Result<Box<dyn Indicator>, ZoneError> {
        match config.source {
            IndicatorSource::Preloaded => Ok(Box::new(PreloadedIndicator {
                name: config.name.clone(),
            })),
            IndicatorSource::Custom => custom::build(&config.name, &config.params),
            IndicatorSource::Library => library::build(&config.name, &config.params),
        }
    }
}

/// No-op indicator for the `preloaded` source: the columns are expected to be
/// in the input already, so nothing is produced.
#[derive(Debug)]
struct PreloadedIndicator {
    name: String,
}

impl Indicator for PreloadedIndicator {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(&self, _df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        Ok(IndicatorResult::empty())
    }
}

/// Prepend NaN so an indicator output of length `<= n` aligns to `n` rows.
pub(crate) fn pad_front(values: &[f64], n: usize) -> Vec<f64> {
    let pad = n.saturating_sub(values.len());
    let mut out = vec![f64::NAN; pad];
    out.extend_from_slice(values);
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_front_aligns_length() {
        let padded = pad_front(&[1.0, 2.0], 5);
        assert_eq!(padded.len(), 5);
        assert!(padded[0].is_nan());
        assert!(padded[2].is_nan());
        assert_eq!(padded[3], 1.0);
        assert_eq!(padded[4], 2.0);
    }

    #[test]
    fn preloaded_source_is_a_no_op() {
        let config = IndicatorConfig::new(IndicatorSource::Preloaded, "macd_hist");
        let indicator = IndicatorFactory::create(&config).unwrap();
        let df = polars::prelude::df! { "close" => &[1.0, 2.0] }.unwrap();
        let result = indicator.calculate(&df).unwrap();
        assert!(result.columns.is_empty());
    }

    #[test]
    fn unknown_custom_indicator_lists_known() {
        let config = IndicatorConfig::new(IndicatorSource::Custom, "vortex");
        let err = IndicatorFactory::create(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("vortex"));
        assert!(msg.contains("macd"));
    }
}

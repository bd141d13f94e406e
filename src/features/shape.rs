//! Shape metrics: distributional form of the oscillator inside a zone.

use serde::{Deserialize, Serialize};

use crate::analysis::stats::{sample_moments, sample_std};
use crate::data;
use crate::errors::ZoneError;
use polars::prelude::DataFrame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeMetrics {
    pub skewness: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
    pub mean: f64,
    pub std: f64,
    /// 1 / (1 + std(diff) / std(values)); 1 is perfectly smooth.
    pub smoothness: f64,
    pub strategy_name: String,
}

pub trait ShapeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate_shape(
        &self,
        df: &DataFrame,
        indicator_col: &str,
    ) -> Result<ShapeMetrics, ZoneError>;
}

/// Statistical shape analysis: moments of the oscillator distribution plus a
/// smoothness score from first differences.
pub struct StatisticalShape;

impl ShapeStrategy for StatisticalShape {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn calculate_shape(
        &self,
        df: &DataFrame,
        indicator_col: &str,
    ) -> Result<ShapeMetrics, ZoneError> {
        let raw = data::column_to_f64(df, indicator_col)?;
        let values: Vec<f64> = raw.iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < 3 {
            return Err(ZoneError::FeatureExtraction(format!(
                "shape analysis needs at least 3 values in '{indicator_col}', got {}",
                values.len()
            )));
        }

        let (mean, std, skewness, kurtosis) =
            sample_moments(&values).expect("non-empty values");

        let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
        let diff_mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let diff_std = sample_std(&diffs, diff_mean);
        let smoothness = if std == 0.0 {
            1.0
        } else {
            1.0 / (1.0 + diff_std / std)
        };

        Ok(ShapeMetrics {
            skewness,
            kurtosis,
            mean,
            std,
            smoothness,
            strategy_name: self.name().to_string(),
        })
    }
}

/// Resolve a shape strategy by name. `None` disables shape analysis.
pub fn create_shape_strategy(
    name: Option<&str>,
) -> Result<Option<Box<dyn ShapeStrategy>>, ZoneError> {
    match name {
        None => Ok(None),
        Some("statistical") => Ok(Some(Box::new(StatisticalShape))),
        Some(other) => Err(ZoneError::Configuration(format!(
            "unknown shape strategy '{other}'. Available: statistical"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn symmetric_series_has_near_zero_skew() {
        let df = df! { "osc" => &[-2.0, -1.0, 0.0, 1.0, 2.0] }.unwrap();
        let m = StatisticalShape.calculate_shape(&df, "osc").unwrap();
        assert!(m.skewness.abs() < 1e-12);
        assert!((m.mean - 0.0).abs() < 1e-12);
    }

    #[test]
    fn right_tail_is_positive_skew() {
        let df = df! { "osc" => &[0.0, 0.1, 0.2, 0.1, 0.0, 10.0] }.unwrap();
        let m = StatisticalShape.calculate_shape(&df, "osc").unwrap();
        assert!(m.skewness > 1.0);
    }

    #[test]
    fn monotone_ramp_is_smoother_than_sawtooth() {
        let ramp = df! { "osc" => &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0] }.unwrap();
        let saw = df! { "osc" => &[0.0, 5.0, 0.0, 5.0, 0.0, 5.0] }.unwrap();
        let smooth = StatisticalShape.calculate_shape(&ramp, "osc").unwrap();
        let rough = StatisticalShape.calculate_shape(&saw, "osc").unwrap();
        assert!(smooth.smoothness > rough.smoothness);
    }

    #[test]
    fn too_few_values_is_extraction_error() {
        let df = df! { "osc" => &[1.0, 2.0] }.unwrap();
        let err = StatisticalShape.calculate_shape(&df, "osc").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::FeatureExtraction);
    }

    #[test]
    fn factory_rejects_unknown_name() {
        assert!(create_shape_strategy(Some("fractal")).is_err());
        assert!(create_shape_strategy(None).unwrap().is_none());
        assert!(create_shape_strategy(Some("statistical")).unwrap().is_some());
    }
}

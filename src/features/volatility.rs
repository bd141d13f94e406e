//! Volatility metrics over a zone window.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::analysis::stats::{mean_or_zero, sample_std};
use crate::data;
use crate::errors::ZoneError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    /// Sample std of bar-to-bar close returns.
    pub returns_std: f64,
    /// `returns_std` expressed in percent.
    pub volatility_score: f64,
    /// `low`, `normal`, or `high`.
    pub volatility_regime: String,
    /// Bollinger band width over the zone as percent of the mid band.
    pub bollinger_width_pct: Option<f64>,
    /// Mean ATR relative to mean close, when an `atr` column exists.
    pub atr_ratio: Option<f64>,
    pub strategy_name: String,
}

pub trait VolatilityStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate_volatility(&self, df: &DataFrame) -> Result<VolatilityMetrics, ZoneError>;
}

/// Regime boundaries on the percent volatility score.
const LOW_REGIME_PCT: f64 = 0.2;
const HIGH_REGIME_PCT: f64 = 1.5;

pub struct StandardVolatility;

impl VolatilityStrategy for StandardVolatility {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn calculate_volatility(&self, df: &DataFrame) -> Result<VolatilityMetrics, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let valid: Vec<f64> = close.iter().copied().filter(|v| v.is_finite()).collect();
        if valid.len() < 3 {
            return Err(ZoneError::FeatureExtraction(format!(
                "volatility analysis needs at least 3 bars, got {}",
                valid.len()
            )));
        }

        let returns: Vec<f64> = valid
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        let returns_mean = mean_or_zero(&returns);
        let returns_std = sample_std(&returns, returns_mean);
        let volatility_score = returns_std * 100.0;

        let volatility_regime = if volatility_score < LOW_REGIME_PCT {
            "low"
        } else if volatility_score > HIGH_REGIME_PCT {
            "high"
        } else {
            "normal"
        };

        // One band window spanning the whole zone.
        let bollinger_width_pct = if valid.len() >= 2 {
            let bands = rust_ti::candle_indicators::bulk::moving_constant_bands(
                &valid,
                rust_ti::ConstantModelType::SimpleMovingAverage,
                rust_ti::DeviationModel::StandardDeviation,
                2.0,
                valid.len(),
            );
            bands.last().and_then(|(lower, mid, upper)| {
                if *mid == 0.0 {
                    None
                } else {
                    Some((upper - lower) / mid * 100.0)
                }
            })
        } else {
            None
        };

        let atr_ratio = if data::column_names(df).iter().any(|c| c == "atr") {
            let atr = data::column_to_f64(df, "atr")?;
            let atr_valid: Vec<f64> = atr.iter().copied().filter(|v| v.is_finite()).collect();
            let close_mean = mean_or_zero(&valid);
            if atr_valid.is_empty() || close_mean == 0.0 {
                None
            } else {
                Some(mean_or_zero(&atr_valid) / close_mean)
            }
        } else {
            None
        };

        Ok(VolatilityMetrics {
            returns_std,
            volatility_score,
            volatility_regime: volatility_regime.to_string(),
            bollinger_width_pct,
            atr_ratio,
            strategy_name: self.name().to_string(),
        })
    }
}

/// Resolve a volatility strategy by name. `None` disables the analysis.
pub fn create_volatility_strategy(
    name: Option<&str>,
) -> Result<Option<Box<dyn VolatilityStrategy>>, ZoneError> {
    match name {
        None => Ok(None),
        Some("standard") => Ok(Some(Box::new(StandardVolatility))),
        Some(other) => Err(ZoneError::Configuration(format!(
            "unknown volatility strategy '{other}'. Available: standard"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn flat_series_is_low_regime() {
        let df = df! { "close" => &[100.0, 100.0, 100.0, 100.0] }.unwrap();
        let m = StandardVolatility.calculate_volatility(&df).unwrap();
        assert!((m.returns_std - 0.0).abs() < f64::EPSILON);
        assert_eq!(m.volatility_regime, "low");
    }

    #[test]
    fn swinging_series_is_high_regime() {
        let df = df! { "close" => &[100.0, 110.0, 95.0, 112.0, 90.0] }.unwrap();
        let m = StandardVolatility.calculate_volatility(&df).unwrap();
        assert_eq!(m.volatility_regime, "high");
        assert!(m.volatility_score > HIGH_REGIME_PCT);
        assert!(m.bollinger_width_pct.unwrap() > 0.0);
    }

    #[test]
    fn atr_ratio_present_with_atr_column() {
        let df = df! {
            "close" => &[100.0, 101.0, 102.0, 101.0],
            "atr" => &[2.0, 2.0, 2.0, 2.0],
        }
        .unwrap();
        let m = StandardVolatility.calculate_volatility(&df).unwrap();
        let ratio = m.atr_ratio.unwrap();
        assert!((ratio - 2.0 / 101.0).abs() < 1e-9);
    }

    #[test]
    fn short_zone_is_extraction_error() {
        let df = df! { "close" => &[100.0, 101.0] }.unwrap();
        let err = StandardVolatility.calculate_volatility(&df).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::FeatureExtraction);
    }

    #[test]
    fn factory_resolves_names() {
        assert!(create_volatility_strategy(Some("standard")).unwrap().is_some());
        assert!(create_volatility_strategy(None).unwrap().is_none());
        assert!(create_volatility_strategy(Some("garch")).is_err());
    }
}

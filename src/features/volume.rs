//! Volume metrics over a zone window.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::analysis::stats::{mean_or_zero, pearson};
use crate::data;
use crate::errors::ZoneError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetrics {
    pub avg_volume_zone: f64,
    pub max_volume_zone: f64,
    /// Least-squares slope of volume over bar position, normalized by the
    /// zone's average volume. Positive means rising volume.
    pub volume_trend: f64,
    /// Bars with volume above 2x the zone average.
    pub num_spikes: usize,
    /// Zone average relative to a pre-zone baseline, when one is supplied.
    pub volume_zone_ratio: Option<f64>,
    /// Pearson correlation between volume and the primary oscillator.
    pub volume_indicator_corr: Option<f64>,
    pub strategy_name: String,
}

pub trait VolumeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate_volume(
        &self,
        df: &DataFrame,
        baseline_volume: Option<f64>,
        indicator_col: Option<&str>,
    ) -> Result<VolumeMetrics, ZoneError>;
}

const SPIKE_MULTIPLE: f64 = 2.0;

pub struct StandardVolume;

impl VolumeStrategy for StandardVolume {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn calculate_volume(
        &self,
        df: &DataFrame,
        baseline_volume: Option<f64>,
        indicator_col: Option<&str>,
    ) -> Result<VolumeMetrics, ZoneError> {
        let volume = data::column_to_f64(df, "volume")?;
        let valid: Vec<f64> = volume.iter().copied().filter(|v| v.is_finite()).collect();
        if valid.is_empty() {
            return Err(ZoneError::FeatureExtraction(
                "volume analysis needs at least one finite volume value".into(),
            ));
        }

        let avg = mean_or_zero(&valid);
        let max = valid.iter().copied().fold(f64::MIN, f64::max);
        let num_spikes = valid
            .iter()
            .filter(|&&v| avg > 0.0 && v > SPIKE_MULTIPLE * avg)
            .count();

        // Least-squares slope of volume against bar position.
        let slope = {
            let n = valid.len() as f64;
            let x_mean = (n - 1.0) / 2.0;
            let mut cov = 0.0;
            let mut var_x = 0.0;
            for (i, &v) in valid.iter().enumerate() {
                let dx = i as f64 - x_mean;
                cov += dx * (v - avg);
                var_x += dx * dx;
            }
            if var_x == 0.0 {
                0.0
            } else {
                cov / var_x
            }
        };
        let volume_trend = if avg == 0.0 { 0.0 } else { slope / avg };

        let volume_zone_ratio = baseline_volume.and_then(|baseline| {
            if baseline > 0.0 {
                Some(avg / baseline)
            } else {
                None
            }
        });

        let volume_indicator_corr = match indicator_col {
            Some(col) => {
                let osc = data::column_to_f64(df, col)?;
                pearson(&volume, &osc)
            }
            None => None,
        };

        Ok(VolumeMetrics {
            avg_volume_zone: avg,
            max_volume_zone: max,
            volume_trend,
            num_spikes,
            volume_zone_ratio,
            volume_indicator_corr,
            strategy_name: self.name().to_string(),
        })
    }
}

/// Resolve a volume strategy by name. `None` disables the analysis.
pub fn create_volume_strategy(
    name: Option<&str>,
) -> Result<Option<Box<dyn VolumeStrategy>>, ZoneError> {
    match name {
        None => Ok(None),
        Some("standard") => Ok(Some(Box::new(StandardVolume))),
        Some(other) => Err(ZoneError::Configuration(format!(
            "unknown volume strategy '{other}'. Available: standard"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn averages_and_spikes() {
        let df = df! { "volume" => &[100.0, 100.0, 100.0, 500.0] }.unwrap();
        let m = StandardVolume.calculate_volume(&df, None, None).unwrap();
        assert!((m.avg_volume_zone - 200.0).abs() < 1e-12);
        assert!((m.max_volume_zone - 500.0).abs() < 1e-12);
        assert_eq!(m.num_spikes, 1);
    }

    #[test]
    fn rising_volume_has_positive_trend() {
        let df = df! { "volume" => &[100.0, 200.0, 300.0, 400.0] }.unwrap();
        let m = StandardVolume.calculate_volume(&df, None, None).unwrap();
        assert!(m.volume_trend > 0.0);
    }

    #[test]
    fn baseline_ratio() {
        let df = df! { "volume" => &[300.0, 300.0] }.unwrap();
        let m = StandardVolume
            .calculate_volume(&df, Some(100.0), None)
            .unwrap();
        assert!((m.volume_zone_ratio.unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn indicator_correlation_tracks_volume() {
        let df = df! {
            "volume" => &[100.0, 200.0, 300.0, 400.0],
            "osc" => &[1.0, 2.0, 3.0, 4.0],
        }
        .unwrap();
        let m = StandardVolume
            .calculate_volume(&df, None, Some("osc"))
            .unwrap();
        assert!((m.volume_indicator_corr.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_volume_column_errors() {
        let df = df! { "close" => &[1.0, 2.0] }.unwrap();
        assert!(StandardVolume.calculate_volume(&df, None, None).is_err());
    }

    #[test]
    fn factory_resolves_names() {
        assert!(create_volume_strategy(Some("standard")).unwrap().is_some());
        assert!(create_volume_strategy(None).unwrap().is_none());
        assert!(create_volume_strategy(Some("vwap")).is_err());
    }
}

//! Classic price/oscillator divergence detection inside a zone.

use find_peaks::PeakFinder;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::data;
use crate::errors::ZoneError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceMetrics {
    /// `bullish`, `bearish`, or `none` (dominant direction by count).
    pub divergence_type: String,
    pub divergence_count: usize,
    /// Mean oscillator gap of detected divergences, normalized by the
    /// oscillator amplitude over the zone.
    pub divergence_strength: Option<f64>,
    pub strategy_name: String,
}

pub trait DivergenceStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn calculate_divergence(
        &self,
        df: &DataFrame,
        indicator_col: &str,
        signal_line: Option<&str>,
    ) -> Result<DivergenceMetrics, ZoneError>;
}

/// Classic divergence: consecutive price extremes compared against the
/// oscillator at the same bars. A higher price high with a lower oscillator
/// high is bearish; a lower price low with a higher oscillator low is bullish.
/// When a signal line is available, divergences are only counted if the
/// oscillator sits on the confirming side of it.
pub struct ClassicDivergence;

impl DivergenceStrategy for ClassicDivergence {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn calculate_divergence(
        &self,
        df: &DataFrame,
        indicator_col: &str,
        signal_line: Option<&str>,
    ) -> Result<DivergenceMetrics, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let osc = data::column_to_f64(df, indicator_col)?;
        let signal = match signal_line {
            Some(col) => Some(data::column_to_f64(df, col)?),
            None => None,
        };
        if close.len() < 5 {
            return Err(ZoneError::FeatureExtraction(format!(
                "divergence analysis needs at least 5 bars, got {}",
                close.len()
            )));
        }

        let amplitude = {
            let finite: Vec<f64> = osc.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                return Err(ZoneError::FeatureExtraction(format!(
                    "oscillator '{indicator_col}' has no finite values"
                )));
            }
            let max = finite.iter().copied().fold(f64::MIN, f64::max);
            let min = finite.iter().copied().fold(f64::MAX, f64::min);
            max - min
        };

        let price_peaks = extrema_positions(&close, false);
        let price_troughs = extrema_positions(&close, true);

        let confirms = |idx: usize, bearish: bool| -> bool {
            match &signal {
                None => true,
                Some(sig) => {
                    let (o, s) = (osc[idx], sig[idx]);
                    if !o.is_finite() || !s.is_finite() {
                        return true;
                    }
                    if bearish {
                        o <= s
                    } else {
                        o >= s
                    }
                }
            }
        };

        let mut bearish = 0usize;
        let mut bullish = 0usize;
        let mut gaps: Vec<f64> = Vec::new();

        for pair in price_peaks.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if close[b] > close[a] && osc[b].is_finite() && osc[a].is_finite() && osc[b] < osc[a]
                && confirms(b, true)
            {
                bearish += 1;
                gaps.push(osc[a] - osc[b]);
            }
        }
        for pair in price_troughs.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if close[b] < close[a] && osc[b].is_finite() && osc[a].is_finite() && osc[b] > osc[a]
                && confirms(b, false)
            {
                bullish += 1;
                gaps.push(osc[b] - osc[a]);
            }
        }

        let count = bearish + bullish;
        let divergence_type = if count == 0 {
            "none"
        } else if bearish >= bullish {
            "bearish"
        } else {
            "bullish"
        };
        let divergence_strength = if gaps.is_empty() || amplitude == 0.0 {
            None
        } else {
            Some(gaps.iter().map(|g| g.abs()).sum::<f64>() / gaps.len() as f64 / amplitude)
        };

        Ok(DivergenceMetrics {
            divergence_type: divergence_type.to_string(),
            divergence_count: count,
            divergence_strength,
            strategy_name: self.name().to_string(),
        })
    }
}

/// Positions of local extrema (prominence-free), troughs when `inverted`.
fn extrema_positions(values: &[f64], inverted: bool) -> Vec<usize> {
    let series: Vec<f64> = if inverted {
        values.iter().map(|v| -v).collect()
    } else {
        values.to_vec()
    };
    let mut finder = PeakFinder::new(&series);
    finder.with_min_prominence(f64::EPSILON);
    let mut positions: Vec<usize> = finder
        .find_peaks()
        .iter()
        .map(find_peaks::Peak::middle_position)
        .collect();
    positions.sort_unstable();
    positions
}

/// Resolve a divergence strategy by name. `None` disables the analysis.
pub fn create_divergence_strategy(
    name: Option<&str>,
) -> Result<Option<Box<dyn DivergenceStrategy>>, ZoneError> {
    match name {
        None => Ok(None),
        Some("classic") => Ok(Some(Box::new(ClassicDivergence))),
        Some(other) => Err(ZoneError::Configuration(format!(
            "unknown divergence strategy '{other}'. Available: classic"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn higher_highs_with_weaker_oscillator_is_bearish() {
        // Price peaks at bars 2 and 6, second one higher; oscillator peaks
        // fade.
        let df = df! {
            "close" => &[100.0, 103.0, 106.0, 102.0, 104.0, 107.0, 108.0, 103.0, 101.0],
            "osc"   => &[0.0, 2.0, 4.0, 1.0, 1.5, 2.5, 3.0, 0.5, 0.0],
        }
        .unwrap();
        let m = ClassicDivergence
            .calculate_divergence(&df, "osc", None)
            .unwrap();
        assert_eq!(m.divergence_type, "bearish");
        assert!(m.divergence_count >= 1);
        assert!(m.divergence_strength.unwrap() > 0.0);
    }

    #[test]
    fn lower_lows_with_stronger_oscillator_is_bullish() {
        let df = df! {
            "close" => &[108.0, 104.0, 100.0, 105.0, 103.0, 98.0, 97.0, 102.0, 104.0],
            "osc"   => &[0.0, -2.0, -4.0, -1.0, -1.5, -2.0, -1.8, -0.5, 0.0],
        }
        .unwrap();
        let m = ClassicDivergence
            .calculate_divergence(&df, "osc", None)
            .unwrap();
        assert_eq!(m.divergence_type, "bullish");
        assert!(m.divergence_count >= 1);
    }

    #[test]
    fn aligned_trend_has_no_divergence() {
        let df = df! {
            "close" => &[100.0, 102.0, 101.0, 104.0, 103.0, 106.0, 105.0, 108.0],
            "osc"   => &[0.0, 1.0, 0.5, 2.0, 1.5, 3.0, 2.5, 4.0],
        }
        .unwrap();
        let m = ClassicDivergence
            .calculate_divergence(&df, "osc", None)
            .unwrap();
        assert_eq!(m.divergence_type, "none");
        assert_eq!(m.divergence_count, 0);
        assert!(m.divergence_strength.is_none());
    }

    #[test]
    fn short_zone_is_extraction_error() {
        let df = df! {
            "close" => &[100.0, 101.0, 102.0],
            "osc" => &[1.0, 2.0, 3.0],
        }
        .unwrap();
        let err = ClassicDivergence
            .calculate_divergence(&df, "osc", None)
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::FeatureExtraction);
    }

    #[test]
    fn factory_resolves_names() {
        assert!(create_divergence_strategy(Some("classic")).unwrap().is_some());
        assert!(create_divergence_strategy(None).unwrap().is_none());
        assert!(create_divergence_strategy(Some("hidden")).is_err());
    }
}

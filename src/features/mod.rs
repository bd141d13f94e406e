//! Per-zone feature extraction.
//!
//! Every step past the basic price metrics is best-effort: a missing input or
//! a failing sub-strategy leaves the corresponding field `None` and records a
//! note, but never aborts the zone or the run.

pub mod divergence;
pub mod shape;
pub mod volatility;
pub mod volume;

use find_peaks::PeakFinder;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::stats::pearson;
use crate::data;
use crate::errors::ZoneError;
use crate::models::{
    AtrSummary, FeatureMetadata, OscillatorSummary, SwingContext, ZoneFeatures, ZoneInfo,
};
use crate::swing::thresholds::{auto_swing_thresholds, DEFAULT_BASE_DEVIATION};
use crate::swing::{
    build_swing_strategy, swing_preset, SwingMetrics, SwingPresetParams, SwingStrategy,
    SWING_STRATEGY_NAMES,
};
use divergence::DivergenceStrategy;
use shape::ShapeStrategy;
use volatility::VolatilityStrategy;
use volume::VolumeStrategy;

/// Which analytical sub-strategies run during feature extraction.
/// `None` disables the corresponding family of metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyNames {
    pub swing: Option<String>,
    pub shape: Option<String>,
    pub divergence: Option<String>,
    pub volatility: Option<String>,
    pub volume: Option<String>,
}

impl StrategyNames {
    pub fn any_configured(&self) -> bool {
        self.swing.is_some()
            || self.shape.is_some()
            || self.divergence.is_some()
            || self.volatility.is_some()
            || self.volume.is_some()
    }
}

/// Whether swings are computed once over the full table or per zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingScope {
    #[default]
    Global,
    PerZone,
}

/// Swing computation settings: scope, parameter preset, and adaptive
/// threshold scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingConfig {
    pub scope: SwingScope,
    pub preset: String,
    pub auto_thresholds: bool,
    pub base_deviation: f64,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            scope: SwingScope::Global,
            preset: "default".to_string(),
            auto_thresholds: false,
            base_deviation: DEFAULT_BASE_DEVIATION,
        }
    }
}

/// Extracts a [`ZoneFeatures`] record from each detected zone.
pub struct ZoneFeatureExtractor {
    min_duration: usize,
    swing_name: Option<String>,
    swing_preset: SwingPresetParams,
    swing_scope: SwingScope,
    auto_thresholds: bool,
    base_deviation: f64,
    shape: Option<Box<dyn ShapeStrategy>>,
    divergence: Option<Box<dyn DivergenceStrategy>>,
    volatility: Option<Box<dyn VolatilityStrategy>>,
    volume: Option<Box<dyn VolumeStrategy>>,
}

impl ZoneFeatureExtractor {
    /// Build an extractor, validating every configured strategy name eagerly.
    pub fn new(
        names: &StrategyNames,
        swing: &SwingConfig,
        min_duration: usize,
    ) -> Result<Self, ZoneError> {
        if let Some(name) = &names.swing {
            if !SWING_STRATEGY_NAMES.contains(&name.as_str()) {
                return Err(ZoneError::Configuration(format!(
                    "unknown swing strategy '{name}'. Available: {}",
                    SWING_STRATEGY_NAMES.join(", ")
                )));
            }
        }
        Ok(Self {
            min_duration,
            swing_name: names.swing.clone(),
            swing_preset: swing_preset(&swing.preset)?,
            swing_scope: swing.scope,
            auto_thresholds: swing.auto_thresholds,
            base_deviation: swing.base_deviation,
            shape: shape::create_shape_strategy(names.shape.as_deref())?,
            divergence: divergence::create_divergence_strategy(names.divergence.as_deref())?,
            volatility: volatility::create_volatility_strategy(names.volatility.as_deref())?,
            volume: volume::create_volume_strategy(names.volume.as_deref())?,
        })
    }

    pub fn swing_enabled(&self) -> bool {
        self.swing_name.is_some()
    }

    pub fn swing_scope(&self) -> SwingScope {
        self.swing_scope
    }

    /// Compute the shared swing context over the full table, when the swing
    /// strategy is configured with global scope.
    pub fn build_global_context(
        &self,
        df: &DataFrame,
    ) -> Result<Option<SwingContext>, ZoneError> {
        let Some(name) = &self.swing_name else {
            return Ok(None);
        };
        if self.swing_scope != SwingScope::Global {
            return Ok(None);
        }
        let thresholds = if self.auto_thresholds {
            Some(auto_swing_thresholds(df, self.base_deviation)?)
        } else {
            None
        };
        let strategy = build_swing_strategy(name, &self.swing_preset, thresholds.as_ref())?;
        Ok(Some(strategy.calculate_global(df)?))
    }

    /// Extract the feature record for one zone.
    pub fn extract(&self, zone: &ZoneInfo) -> Result<ZoneFeatures, ZoneError> {
        let df = &zone.data;
        if zone.duration < self.min_duration {
            return Err(ZoneError::FeatureExtraction(format!(
                "zone {} duration {} is below the minimum {}",
                zone.zone_id, zone.duration, self.min_duration
            )));
        }

        let close = data::column_to_f64(df, "close")?;
        let high = data::column_to_f64(df, "high")?;
        let low = data::column_to_f64(df, "low")?;
        let columns = data::column_names(df);
        let mut notes: Vec<String> = Vec::new();

        let start_price = close[0];
        let end_price = close[close.len() - 1];
        if !start_price.is_finite() || start_price == 0.0 || !end_price.is_finite() {
            return Err(ZoneError::FeatureExtraction(format!(
                "zone {} has unusable boundary prices ({start_price}, {end_price})",
                zone.zone_id
            )));
        }
        let price_return = end_price / start_price - 1.0;

        let max_price = high.iter().copied().filter(|v| v.is_finite()).fold(f64::MIN, f64::max);
        let min_price = low.iter().copied().filter(|v| v.is_finite()).fold(f64::MAX, f64::min);
        let price_range_pct = if min_price > 0.0 {
            max_price / min_price - 1.0
        } else {
            notes.push("non-positive low price; price_range_pct set to 0".to_string());
            0.0
        };

        // Primary indicator resolution: indicator context first, generic
        // fallback second. The chosen column is reported in the metadata.
        let mut resolved_by_fallback = false;
        let osc_col: Option<String> = match &zone.indicator_context.detection_indicator {
            Some(col) if columns.iter().any(|c| c == col) => Some(col.clone()),
            Some(col) => {
                notes.push(format!(
                    "detection indicator '{col}' not present in zone data; using fallback"
                ));
                resolved_by_fallback = true;
                data::fallback_oscillator(df)
            }
            None => {
                resolved_by_fallback = true;
                data::fallback_oscillator(df)
            }
        };
        let signal_col: Option<String> = zone
            .indicator_context
            .signal_line
            .as_ref()
            .filter(|col| columns.iter().any(|c| c == *col))
            .cloned();

        let mut hist_amplitude = None;
        let mut hist_slope = None;
        let mut oscillator_summary = None;
        let mut osc_values: Option<Vec<f64>> = None;
        if let Some(col) = &osc_col {
            let values = data::column_to_f64(df, col)?;
            let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                notes.push(format!("oscillator '{col}' has no finite values"));
            } else {
                let max = finite.iter().copied().fold(f64::MIN, f64::max);
                let min = finite.iter().copied().fold(f64::MAX, f64::min);
                hist_amplitude = Some(max - min);
                let mean = finite.iter().sum::<f64>() / finite.len() as f64;
                let std = crate::analysis::stats::sample_std(&finite, mean);
                if values.len() >= 2 {
                    hist_slope = values
                        .windows(2)
                        .filter(|w| w[0].is_finite() && w[1].is_finite())
                        .map(|w| (w[1] - w[0]).abs())
                        .fold(None, |acc: Option<f64>, v| {
                            Some(acc.map_or(v, |a| a.max(v)))
                        });
                }
                oscillator_summary = Some(OscillatorSummary {
                    name: col.clone(),
                    max,
                    min,
                    mean,
                    std,
                    resolved_by_fallback,
                });
            }
            osc_values = Some(values);
        } else {
            notes.push("no oscillator column available".to_string());
        }

        // Serialized fields must stay finite; NaN head values from rolling
        // ATR are skipped for the summary but still gate normalization.
        let atr_summary = if columns.iter().any(|c| c == "atr") {
            let atr = data::column_to_f64(df, "atr")?;
            let first_finite = atr.iter().copied().find(|v| v.is_finite());
            let last_finite = atr.iter().copied().rev().find(|v| v.is_finite());
            let finite: Vec<f64> = atr.iter().copied().filter(|v| v.is_finite()).collect();
            match (first_finite, last_finite) {
                (Some(first), Some(last)) => Some((
                    atr[0],
                    AtrSummary {
                        start: first,
                        end: last,
                        mean: finite.iter().sum::<f64>() / finite.len() as f64,
                    },
                )),
                _ => None,
            }
        } else {
            None
        };
        let atr_normalized_return = atr_summary.as_ref().and_then(|(start, _)| {
            if start.is_finite() && *start > 0.0 {
                Some(price_return / start)
            } else {
                None
            }
        });

        let correlation_price_hist = if zone.duration >= 3 {
            osc_values
                .as_ref()
                .and_then(|osc| pearson(&close, osc))
        } else {
            None
        };

        let (num_peaks, num_troughs) = if high.len() >= 3 {
            (
                Some(count_extrema(&high, false)),
                Some(count_extrema(&low, true)),
            )
        } else {
            notes.push("zone too short for peak counting".to_string());
            (None, None)
        };

        // Type-specific timing metrics.
        let mut drawdown_from_peak = None;
        let mut rally_from_trough = None;
        let mut peak_time_ratio = None;
        let mut trough_time_ratio = None;
        match zone.zone_type.as_str() {
            "bull" => {
                if max_price > 0.0 {
                    drawdown_from_peak = Some(end_price / max_price - 1.0);
                }
                if let Some(pos) = argmax(&high) {
                    peak_time_ratio = Some(pos as f64 / zone.duration as f64);
                }
            }
            "bear" => {
                if min_price > 0.0 {
                    rally_from_trough = Some(end_price / min_price - 1.0);
                }
                if let Some(pos) = argmin(&low) {
                    trough_time_ratio = Some(pos as f64 / zone.duration as f64);
                }
            }
            _ => {}
        }

        let swing_metrics = self.run_swing(zone, &mut notes);
        let shape_metrics = self.run_shape(df, osc_col.as_deref(), &mut notes);
        let divergence_metrics =
            self.run_divergence(df, osc_col.as_deref(), signal_col.as_deref(), &mut notes);
        let volatility_metrics = self.run_volatility(df, &mut notes);
        let volume_metrics = self.run_volume(df, &columns, osc_col.as_deref(), &mut notes);

        Ok(ZoneFeatures {
            zone_id: zone.zone_id,
            zone_type: zone.zone_type.clone(),
            duration: zone.duration,
            start_price,
            end_price,
            price_return,
            price_range_pct,
            hist_amplitude,
            hist_slope,
            atr_normalized_return,
            correlation_price_hist,
            num_peaks,
            num_troughs,
            drawdown_from_peak,
            rally_from_trough,
            peak_time_ratio,
            trough_time_ratio,
            metadata: FeatureMetadata {
                oscillator: oscillator_summary,
                max_price,
                min_price,
                atr: atr_summary.map(|(_, summary)| summary),
                swing_metrics,
                shape_metrics,
                divergence_metrics,
                volatility_metrics,
                volume_metrics,
                notes,
            },
        })
    }

    fn run_swing(&self, zone: &ZoneInfo, notes: &mut Vec<String>) -> Option<SwingMetrics> {
        let name = self.swing_name.as_ref()?;
        let result = (|| -> Result<SwingMetrics, ZoneError> {
            if self.swing_scope == SwingScope::Global {
                if let Some(context) = zone.swing_context.as_ref() {
                    let strategy = build_swing_strategy(name, &self.swing_preset, None)?;
                    return Ok(strategy.aggregate_for_zone(zone, context));
                }
                notes.push("no swing context available; computed swings per-zone".to_string());
            }
            let thresholds = if self.auto_thresholds {
                Some(auto_swing_thresholds(&zone.data, self.base_deviation)?)
            } else {
                None
            };
            let strategy = build_swing_strategy(name, &self.swing_preset, thresholds.as_ref())?;
            strategy.calculate_zone(&zone.data, zone.start_idx)
        })();
        match result {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                debug!(zone = zone.zone_id, %err, "swing metrics unavailable");
                notes.push(format!("swing metrics unavailable: {err}"));
                None
            }
        }
    }

    fn run_shape(
        &self,
        df: &DataFrame,
        osc_col: Option<&str>,
        notes: &mut Vec<String>,
    ) -> Option<shape::ShapeMetrics> {
        let strategy = self.shape.as_ref()?;
        let Some(col) = osc_col else {
            notes.push("shape metrics skipped: no oscillator column".to_string());
            return None;
        };
        match strategy.calculate_shape(df, col) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                notes.push(format!("shape metrics unavailable: {err}"));
                None
            }
        }
    }

    fn run_divergence(
        &self,
        df: &DataFrame,
        osc_col: Option<&str>,
        signal_col: Option<&str>,
        notes: &mut Vec<String>,
    ) -> Option<divergence::DivergenceMetrics> {
        let strategy = self.divergence.as_ref()?;
        let Some(col) = osc_col else {
            notes.push("divergence metrics skipped: no oscillator column".to_string());
            return None;
        };
        match strategy.calculate_divergence(df, col, signal_col) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                notes.push(format!("divergence metrics unavailable: {err}"));
                None
            }
        }
    }

    fn run_volatility(
        &self,
        df: &DataFrame,
        notes: &mut Vec<String>,
    ) -> Option<volatility::VolatilityMetrics> {
        let strategy = self.volatility.as_ref()?;
        match strategy.calculate_volatility(df) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                notes.push(format!("volatility metrics unavailable: {err}"));
                None
            }
        }
    }

    fn run_volume(
        &self,
        df: &DataFrame,
        columns: &[String],
        osc_col: Option<&str>,
        notes: &mut Vec<String>,
    ) -> Option<volume::VolumeMetrics> {
        let strategy = self.volume.as_ref()?;
        if !columns.iter().any(|c| c == "volume") {
            notes.push("volume metrics skipped: no volume column".to_string());
            return None;
        }
        match strategy.calculate_volume(df, None, osc_col) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                notes.push(format!("volume metrics unavailable: {err}"));
                None
            }
        }
    }
}

/// Count local extrema above the series mean, mirroring a plain peak finder
/// with default settings. Troughs count below-mean extrema of the negated
/// series.
fn count_extrema(values: &[f64], inverted: bool) -> usize {
    let series: Vec<f64> = if inverted {
        values.iter().map(|v| -v).collect()
    } else {
        values.to_vec()
    };
    let finite: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 3 {
        return 0;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let mut finder = PeakFinder::new(&series);
    finder.with_min_height(mean);
    finder.find_peaks().len()
}

/// Position of the first maximum among finite values.
fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite").then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
}

/// Position of the first minimum among finite values.
fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.partial_cmp(b.1).expect("finite"))
        .map(|(i, _)| i)
}

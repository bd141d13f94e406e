//! Swing analysis: pivot detection strategies, the shared swing context, and
//! per-zone swing metrics.

pub mod peaks;
pub mod pivot;
pub mod thresholds;
pub mod zigzag;

use std::collections::BTreeMap;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::errors::ZoneError;
use crate::models::{SwingContext, SwingKind, SwingPoint, ZoneInfo};
use thresholds::SwingThresholds;

/// Swing metrics for one zone, computed from the pivots inside the zone plus
/// at most one flanking pivot on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingMetrics {
    /// Pivot-to-pivot transitions covering the zone.
    pub num_swings: usize,
    pub rally_count: usize,
    pub drop_count: usize,
    /// Mean fractional change per rally leg (positive).
    pub avg_rally: Option<f64>,
    /// Mean fractional change per drop leg (negative, sign preserved).
    pub avg_drop: Option<f64>,
    /// `rally_count / drop_count`, 0 when there are no drops.
    pub rally_to_drop_ratio: f64,
    /// Mean rally length in bars.
    pub avg_rally_duration: Option<f64>,
    /// Mean drop length in bars.
    pub avg_drop_duration: Option<f64>,
    pub strategy_name: String,
    pub strategy_params: BTreeMap<String, f64>,
}

impl SwingMetrics {
    pub fn empty(strategy_name: &str, strategy_params: BTreeMap<String, f64>) -> Self {
        Self {
            num_swings: 0,
            rally_count: 0,
            drop_count: 0,
            avg_rally: None,
            avg_drop: None,
            rally_to_drop_ratio: 0.0,
            avg_rally_duration: None,
            avg_drop_duration: None,
            strategy_name: strategy_name.to_string(),
            strategy_params,
        }
    }
}

/// Compute leg metrics from an ordered pivot sequence.
pub(crate) fn metrics_from_points(
    points: &[SwingPoint],
    strategy_name: &str,
    strategy_params: BTreeMap<String, f64>,
) -> SwingMetrics {
    if points.len() < 2 {
        return SwingMetrics::empty(strategy_name, strategy_params);
    }

    let mut rallies: Vec<(f64, usize)> = Vec::new();
    let mut drops: Vec<(f64, usize)> = Vec::new();
    for pair in points.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        if from.price == 0.0 {
            continue;
        }
        let change = to.price / from.price - 1.0;
        let bars = to.index - from.index;
        if to.price >= from.price {
            rallies.push((change, bars));
        } else {
            drops.push((change, bars));
        }
    }

    let mean = |xs: &[(f64, usize)], pick: fn(&(f64, usize)) -> f64| -> Option<f64> {
        if xs.is_empty() {
            None
        } else {
            Some(xs.iter().map(pick).sum::<f64>() / xs.len() as f64)
        }
    };

    let rally_count = rallies.len();
    let drop_count = drops.len();
    SwingMetrics {
        num_swings: rally_count + drop_count,
        rally_count,
        drop_count,
        avg_rally: mean(&rallies, |x| x.0),
        avg_drop: mean(&drops, |x| x.0),
        rally_to_drop_ratio: if drop_count == 0 {
            0.0
        } else {
            rally_count as f64 / drop_count as f64
        },
        avg_rally_duration: mean(&rallies, |x| x.1 as f64),
        avg_drop_duration: mean(&drops, |x| x.1 as f64),
        strategy_name: strategy_name.to_string(),
        strategy_params,
    }
}

/// A pivot detection algorithm usable both globally (shared context) and on a
/// single zone window.
pub trait SwingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Numeric parameters, echoed into metrics and cache signatures.
    fn params(&self) -> BTreeMap<String, f64>;

    /// Find pivots over the given frame; indices are frame-relative.
    fn find_pivots(&self, df: &DataFrame) -> Result<Vec<SwingPoint>, ZoneError>;

    /// Compute pivots over the full table once, for sharing across zones.
    fn calculate_global(&self, df: &DataFrame) -> Result<SwingContext, ZoneError> {
        let points = self.find_pivots(df)?;
        SwingContext::new(points, df.height(), self.name(), self.params())
    }

    /// Swing metrics for a zone using the shared context (global scope).
    fn aggregate_for_zone(&self, zone: &ZoneInfo, context: &SwingContext) -> SwingMetrics {
        let sliced = context.slice(zone.start_idx, zone.end_idx);
        metrics_from_points(
            sliced,
            &context.strategy_name,
            context.strategy_params.clone(),
        )
    }

    /// Swing metrics for a zone in isolation (per-zone scope). `offset` maps
    /// frame-relative pivot indices back to full-table positions.
    fn calculate_zone(&self, zone_df: &DataFrame, offset: usize) -> Result<SwingMetrics, ZoneError> {
        let mut points = self.find_pivots(zone_df)?;
        for point in &mut points {
            point.index += offset;
        }
        Ok(metrics_from_points(&points, self.name(), self.params()))
    }
}

// ── Presets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZigZagParams {
    /// Minimum bars per leg.
    pub legs: usize,
    /// Fractional reversal required to commit a pivot.
    pub deviation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindPeaksParams {
    /// Required prominence as a fraction of the median price.
    pub prominence: f64,
    /// Minimum bars between kept pivots.
    pub distance: usize,
    /// Minimum fractional amplitude between consecutive pivots.
    pub min_amplitude_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotPointsParams {
    /// Bars to the left that a fractal pivot must dominate.
    pub left: usize,
    /// Bars to the right that a fractal pivot must dominate.
    pub right: usize,
    /// Minimum fractional amplitude between consecutive pivots.
    pub min_amplitude_pct: f64,
}

/// Per-strategy parameter bundle resolved from a preset name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPresetParams {
    pub zigzag: ZigZagParams,
    pub find_peaks: FindPeaksParams,
    pub pivot_points: PivotPointsParams,
}

pub const SWING_PRESET_NAMES: &[&str] = &["default", "narrow_zone", "wide_zone"];
pub const SWING_STRATEGY_NAMES: &[&str] = &["zigzag", "find_peaks", "pivot_points"];

/// Resolve a named preset. Unknown names fail listing the alternatives.
pub fn swing_preset(name: &str) -> Result<SwingPresetParams, ZoneError> {
    match name {
        "default" => Ok(SwingPresetParams {
            zigzag: ZigZagParams {
                legs: 2,
                deviation: 0.02,
            },
            find_peaks: FindPeaksParams {
                prominence: 0.015,
                distance: 3,
                min_amplitude_pct: 0.01,
            },
            pivot_points: PivotPointsParams {
                left: 2,
                right: 2,
                min_amplitude_pct: 0.01,
            },
        }),
        // Tighter thresholds so short zones still accumulate swings.
        "narrow_zone" => Ok(SwingPresetParams {
            zigzag: ZigZagParams {
                legs: 1,
                deviation: 0.005,
            },
            find_peaks: FindPeaksParams {
                prominence: 0.004,
                distance: 2,
                min_amplitude_pct: 0.003,
            },
            pivot_points: PivotPointsParams {
                left: 1,
                right: 1,
                min_amplitude_pct: 0.003,
            },
        }),
        // Coarser thresholds for long trending zones.
        "wide_zone" => Ok(SwingPresetParams {
            zigzag: ZigZagParams {
                legs: 4,
                deviation: 0.05,
            },
            find_peaks: FindPeaksParams {
                prominence: 0.03,
                distance: 6,
                min_amplitude_pct: 0.02,
            },
            pivot_points: PivotPointsParams {
                left: 3,
                right: 3,
                min_amplitude_pct: 0.02,
            },
        }),
        other => Err(ZoneError::Configuration(format!(
            "unknown swing preset '{other}'. Available: {}",
            SWING_PRESET_NAMES.join(", ")
        ))),
    }
}

/// Build a swing strategy by name, optionally overriding the deviation-like
/// parameter from adaptive thresholds.
pub fn build_swing_strategy(
    name: &str,
    preset: &SwingPresetParams,
    auto: Option<&SwingThresholds>,
) -> Result<Box<dyn SwingStrategy>, ZoneError> {
    match name {
        "zigzag" => {
            let mut params = preset.zigzag.clone();
            if let Some(t) = auto {
                params.deviation = t.swing_deviation;
            }
            Ok(Box::new(zigzag::ZigZagSwing::new(params)))
        }
        "find_peaks" => {
            let mut params = preset.find_peaks.clone();
            if let Some(t) = auto {
                params.prominence = t.peak_prominence;
            }
            Ok(Box::new(peaks::FindPeaksSwing::new(params)))
        }
        "pivot_points" => {
            let mut params = preset.pivot_points.clone();
            if let Some(t) = auto {
                params.min_amplitude_pct = t.pivot_deviation;
            }
            Ok(Box::new(pivot::PivotPointsSwing::new(params)))
        }
        other => Err(ZoneError::Configuration(format!(
            "unknown swing strategy '{other}'. Available: {}",
            SWING_STRATEGY_NAMES.join(", ")
        ))),
    }
}

/// Drop pivots violating alternation, minimum bar gap, or minimum amplitude.
/// Consecutive same-kind pivots keep the more extreme one.
pub(crate) fn clean_pivots(
    mut pivots: Vec<SwingPoint>,
    min_gap_bars: usize,
    min_amplitude_abs: f64,
) -> Vec<SwingPoint> {
    pivots.sort_by_key(|p| p.index);
    let mut kept: Vec<SwingPoint> = Vec::with_capacity(pivots.len());
    for pivot in pivots {
        match kept.last_mut() {
            None => kept.push(pivot),
            Some(last) => {
                if last.kind == pivot.kind {
                    let replace = match pivot.kind {
                        SwingKind::Peak => pivot.price > last.price,
                        SwingKind::Trough => pivot.price < last.price,
                    };
                    if replace {
                        *last = pivot;
                    }
                } else if pivot.index - last.index >= min_gap_bars
                    && (pivot.price - last.price).abs() >= min_amplitude_abs
                {
                    kept.push(pivot);
                }
            }
        }
    }
    for (i, pivot) in kept.iter_mut().enumerate() {
        pivot.point_id = i;
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(id: usize, index: usize, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint {
            point_id: id,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::hours(index as i64),
            index,
            price,
            kind,
        }
    }

    #[test]
    fn metrics_for_alternating_pivots() {
        let points = vec![
            point(0, 0, 100.0, SwingKind::Trough),
            point(1, 5, 110.0, SwingKind::Peak),
            point(2, 10, 99.0, SwingKind::Trough),
            point(3, 15, 120.0, SwingKind::Peak),
        ];
        let m = metrics_from_points(&points, "zigzag", BTreeMap::new());
        assert_eq!(m.num_swings, 3);
        assert_eq!(m.rally_count, 2);
        assert_eq!(m.drop_count, 1);
        assert!(m.avg_rally.unwrap() > 0.0);
        assert!(m.avg_drop.unwrap() < 0.0);
        assert!((m.rally_to_drop_ratio - 2.0).abs() < f64::EPSILON);
        assert!((m.avg_rally_duration.unwrap() - 5.0).abs() < f64::EPSILON);
        assert!((m.avg_drop_duration.unwrap() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_pivot_yields_empty_metrics() {
        let points = vec![point(0, 3, 100.0, SwingKind::Peak)];
        let m = metrics_from_points(&points, "zigzag", BTreeMap::new());
        assert_eq!(m.num_swings, 0);
        assert!(m.avg_rally.is_none());
        assert!((m.rally_to_drop_ratio - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_drops_means_zero_ratio() {
        let points = vec![
            point(0, 0, 100.0, SwingKind::Trough),
            point(1, 4, 105.0, SwingKind::Peak),
        ];
        let m = metrics_from_points(&points, "zigzag", BTreeMap::new());
        assert_eq!(m.rally_count, 1);
        assert_eq!(m.drop_count, 0);
        assert!((m.rally_to_drop_ratio - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clean_pivots_merges_same_kind() {
        let pivots = vec![
            point(0, 0, 100.0, SwingKind::Peak),
            point(1, 2, 105.0, SwingKind::Peak),
            point(2, 6, 95.0, SwingKind::Trough),
        ];
        let cleaned = clean_pivots(pivots, 1, 0.0);
        assert_eq!(cleaned.len(), 2);
        assert!((cleaned[0].price - 105.0).abs() < f64::EPSILON);
        assert_eq!(cleaned[0].point_id, 0);
        assert_eq!(cleaned[1].point_id, 1);
    }

    #[test]
    fn clean_pivots_enforces_amplitude() {
        let pivots = vec![
            point(0, 0, 100.0, SwingKind::Peak),
            point(1, 5, 99.9, SwingKind::Trough),
            point(2, 10, 90.0, SwingKind::Trough),
        ];
        let cleaned = clean_pivots(pivots, 1, 1.0);
        // The shallow trough fails the amplitude filter; the deeper one passes.
        assert_eq!(cleaned.len(), 2);
        assert!((cleaned[1].price - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_preset_fails() {
        let err = swing_preset("micro").unwrap_err();
        assert!(err.to_string().contains("narrow_zone"));
    }

    #[test]
    fn presets_resolve() {
        for name in SWING_PRESET_NAMES {
            let preset = swing_preset(name).unwrap();
            assert!(preset.zigzag.deviation > 0.0);
            assert!(preset.find_peaks.prominence > 0.0);
        }
    }
}

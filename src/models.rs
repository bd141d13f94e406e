//! Core data model: zones, swing context, per-zone features, and the
//! assembled analysis result.
//!
//! `ZoneInfo.data` is a zero-copy slice of the input frame (polars buffers are
//! Arc-backed). Serialization drops the slice and the swing handle; loaded
//! zones are rehydrated without them and anything that needs the swing
//! context reports its absence gracefully.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::analysis::clustering::ClusteringResult;
use crate::analysis::hypothesis::HypothesisTestReport;
use crate::analysis::regression::RegressionReport;
use crate::analysis::sequence::SequenceAnalysis;
use crate::analysis::stats::ZoneStatistics;
use crate::detect::RuleValue;
use crate::errors::ZoneError;

/// How a zone was detected. This is the *sole* channel by which downstream
/// strategies learn which column(s) to analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorContext {
    pub detection_strategy: String,
    /// Primary indicator column, when the strategy has one.
    pub detection_indicator: Option<String>,
    /// Secondary companion line (line-crossing strategies).
    pub signal_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thresholds: Option<ThresholdPair>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub logic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub num_conditions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
    /// Echo of the (serializable) detection rules.
    #[serde(default)]
    pub detection_rules: BTreeMap<String, RuleValue>,
}

impl IndicatorContext {
    pub fn new(strategy: &str) -> Self {
        Self {
            detection_strategy: strategy.to_string(),
            detection_indicator: None,
            signal_line: None,
            thresholds: None,
            logic: None,
            num_conditions: None,
            source: None,
            detection_rules: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub upper: f64,
    pub lower: f64,
}

/// One detected zone: a contiguous bar range where the detection rule held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone_id: usize,
    #[serde(rename = "type")]
    pub zone_type: String,
    pub start_idx: usize,
    pub end_idx: usize,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// `end_idx - start_idx + 1`.
    pub duration: usize,
    /// Bar slice over `[start_idx, end_idx]`. Not serialized.
    #[serde(skip, default)]
    pub data: DataFrame,
    /// Filled by feature extraction; absent before.
    pub features: Option<ZoneFeatures>,
    pub indicator_context: IndicatorContext,
    /// Borrowed handle to the shared swing context, valid for the run.
    #[serde(skip, default)]
    pub swing_context: Option<Arc<SwingContext>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    Peak,
    Trough,
}

/// A single price pivot found by a swing strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub point_id: usize,
    pub timestamp: NaiveDateTime,
    /// Bar position in the full input table.
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Swing pivots precomputed over the full table, sliceable per zone.
///
/// Computed once per run and shared read-only. Per-zone recomputation loses
/// pivots at zone boundaries and misses swings whose arms straddle the edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingContext {
    points: Vec<SwingPoint>,
    /// Pivot bar positions, sorted ascending, for binary-search slicing.
    indices: Vec<usize>,
    pub full_data_length: usize,
    pub strategy_name: String,
    pub strategy_params: BTreeMap<String, f64>,
}

impl SwingContext {
    pub fn new(
        points: Vec<SwingPoint>,
        full_data_length: usize,
        strategy_name: &str,
        strategy_params: BTreeMap<String, f64>,
    ) -> Result<Self, ZoneError> {
        if points.windows(2).any(|w| w[1].index < w[0].index) {
            return Err(ZoneError::Internal(
                "swing points must be sorted by index".into(),
            ));
        }
        let indices = points.iter().map(|p| p.index).collect();
        Ok(Self {
            points,
            indices,
            full_data_length,
            strategy_name: strategy_name.to_string(),
            strategy_params,
        })
    }

    pub fn points(&self) -> &[SwingPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All pivots with `index ∈ [start_idx, end_idx]`, extended by at most one
    /// neighbour on each side so a zone with no interior pivot still sees its
    /// surrounding structure.
    pub fn slice(&self, start_idx: usize, end_idx: usize) -> &[SwingPoint] {
        if self.points.is_empty() {
            return &[];
        }
        let first_inside = self.indices.partition_point(|&i| i < start_idx);
        let after_last = self.indices.partition_point(|&i| i <= end_idx);
        let lo = first_inside.saturating_sub(1);
        let hi = (after_last + 1).min(self.points.len());
        &self.points[lo..hi]
    }
}

/// Summary statistics of the resolved oscillator column inside a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSummary {
    pub name: String,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub std: f64,
    /// True when the column was chosen by generic fallback rather than from
    /// the zone's indicator context.
    pub resolved_by_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrSummary {
    pub start: f64,
    pub end: f64,
    pub mean: f64,
}

/// Nested sub-strategy outputs and debug notes for one zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub oscillator: Option<OscillatorSummary>,
    pub max_price: f64,
    pub min_price: f64,
    pub atr: Option<AtrSummary>,
    pub swing_metrics: Option<crate::swing::SwingMetrics>,
    pub shape_metrics: Option<crate::features::shape::ShapeMetrics>,
    pub divergence_metrics: Option<crate::features::divergence::DivergenceMetrics>,
    pub volatility_metrics: Option<crate::features::volatility::VolatilityMetrics>,
    pub volume_metrics: Option<crate::features::volume::VolumeMetrics>,
    /// Debug notes for best-effort steps that were skipped.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Quantitative features of a single zone. Fields not computed are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFeatures {
    pub zone_id: usize,
    pub zone_type: String,
    pub duration: usize,
    pub start_price: f64,
    pub end_price: f64,
    /// `end_price / start_price - 1`.
    pub price_return: f64,
    /// `max(high) / min(low) - 1`.
    pub price_range_pct: f64,
    /// Oscillator amplitude `max - min` over the zone.
    pub hist_amplitude: Option<f64>,
    /// Maximum single-step absolute change of the oscillator.
    pub hist_slope: Option<f64>,
    pub atr_normalized_return: Option<f64>,
    pub correlation_price_hist: Option<f64>,
    pub num_peaks: Option<usize>,
    pub num_troughs: Option<usize>,
    /// Bull zones: `end_price / max(high) - 1`.
    pub drawdown_from_peak: Option<f64>,
    /// Bear zones: `end_price / min(low) - 1`.
    pub rally_from_trough: Option<f64>,
    /// Bull zones: position of the high inside the zone, in `[0, 1]`.
    pub peak_time_ratio: Option<f64>,
    /// Bear zones: position of the low inside the zone, in `[0, 1]`.
    pub trough_time_ratio: Option<f64>,
    pub metadata: FeatureMetadata,
}

/// Validation is delegated to external collaborators; the engine only records
/// whether it was requested and why it did not execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub requested: bool,
    pub executed: bool,
    pub reason: String,
}

impl ValidationOutcome {
    pub fn requested_not_executed() -> Self {
        Self {
            requested: true,
            executed: false,
            reason: "validation requires an external validation suite".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// UTC timestamp of the analysis run.
    pub analysis_timestamp: NaiveDateTime,
    pub total_zones: usize,
    /// Distinct zone types observed, sorted.
    pub zone_types: Vec<String>,
    pub n_bars: usize,
    pub n_columns: usize,
    pub clustering_performed: bool,
    pub regression_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sequence_skipped_reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Canonical echo of the pipeline configuration, when serializable.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub config: Option<serde_json::Value>,
}

/// Full output of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAnalysisResult {
    pub zones: Vec<ZoneInfo>,
    pub statistics: ZoneStatistics,
    pub hypothesis_tests: HypothesisTestReport,
    pub clustering: Option<ClusteringResult>,
    pub sequence_analysis: Option<SequenceAnalysis>,
    pub regression_results: Option<RegressionReport>,
    pub validation_results: Option<ValidationOutcome>,
    /// The analyzed table (with realized indicators). Not serialized.
    #[serde(skip, default)]
    pub data: Option<DataFrame>,
    pub metadata: AnalysisMetadata,
}

impl ZoneAnalysisResult {
    /// Write the result as pretty JSON. The bar slices inside zones are
    /// dropped (they are views over the caller's input).
    pub fn save_json(&self, path: &Path) -> Result<(), ZoneError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ZoneError::Data(format!("failed to serialize result: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| ZoneError::Data(format!("failed to write {}: {e}", path.display())))
    }

    /// Load a result previously written with [`save_json`]. Zones come back
    /// without bar data or swing context.
    ///
    /// [`save_json`]: ZoneAnalysisResult::save_json
    pub fn load_json(path: &Path) -> Result<Self, ZoneError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ZoneError::Data(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ZoneError::Data(format!("failed to deserialize result: {e}")))
    }
}

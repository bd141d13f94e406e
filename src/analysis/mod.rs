//! Universal zone analyzer: orchestrates feature extraction and every
//! population-level analysis into one result.

pub mod clustering;
pub mod hypothesis;
pub mod regression;
pub mod sequence;
pub mod stats;

use chrono::Utc;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ZoneError;
use crate::features::ZoneFeatureExtractor;
use crate::models::{AnalysisMetadata, ValidationOutcome, ZoneAnalysisResult, ZoneFeatures, ZoneInfo};
use hypothesis::HypothesisTestSuite;
use sequence::MIN_ZONES_FOR_SEQUENCE;

/// Regression runs only with more zones than this.
pub const MIN_ZONES_FOR_REGRESSION: usize = 10;
/// Validation runs only with more zones than this.
pub const MIN_ZONES_FOR_VALIDATION: usize = 20;

/// Zone count from which per-zone feature extraction fans out over rayon.
const PARALLEL_THRESHOLD: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub perform_clustering: bool,
    pub n_clusters: usize,
    pub run_regression: bool,
    pub run_validation: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            perform_clustering: true,
            n_clusters: 3,
            run_regression: false,
            run_validation: false,
        }
    }
}

/// Orchestrator over a list of detected zones. It does not know where the
/// zones came from, only how to analyze them.
pub struct UniversalZoneAnalyzer {
    extractor: ZoneFeatureExtractor,
    hypotheses: HypothesisTestSuite,
    parallel: bool,
}

impl UniversalZoneAnalyzer {
    pub fn new(extractor: ZoneFeatureExtractor) -> Self {
        Self {
            extractor,
            hypotheses: HypothesisTestSuite::default(),
            parallel: true,
        }
    }

    pub fn with_hypothesis_suite(mut self, suite: HypothesisTestSuite) -> Self {
        self.hypotheses = suite;
        self
    }

    /// Disable the rayon fan-out in per-zone extraction.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn extractor(&self) -> &ZoneFeatureExtractor {
        &self.extractor
    }

    /// Run the full analysis and assemble the result. Empty input yields an
    /// empty result with zeroed counts, never an error.
    pub fn analyze_zones(
        &self,
        mut zones: Vec<ZoneInfo>,
        df: &DataFrame,
        options: &AnalysisOptions,
        mut warnings: Vec<String>,
    ) -> Result<ZoneAnalysisResult, ZoneError> {
        if zones.is_empty() {
            warn!("no zones provided; returning empty result");
            return Ok(empty_result(df, warnings));
        }
        info!(total = zones.len(), "starting zone analysis");

        // 1. Feature extraction, optionally in parallel. Zone slices and the
        // shared swing context are read-only, so the fan-out is safe.
        let extracted: Vec<Result<ZoneFeatures, ZoneError>> =
            if self.parallel && zones.len() >= PARALLEL_THRESHOLD {
                zones.par_iter().map(|z| self.extractor.extract(z)).collect()
            } else {
                zones.iter().map(|z| self.extractor.extract(z)).collect()
            };
        for (zone, result) in zones.iter_mut().zip(extracted) {
            match result {
                Ok(features) => zone.features = Some(features),
                Err(err) => {
                    let msg = format!("feature extraction failed for zone {}: {err}", zone.zone_id);
                    warn!("{msg}");
                    warnings.push(msg);
                }
            }
        }
        // Chronology is part of the contract regardless of extraction order.
        zones.sort_by_key(|z| z.start_idx);

        let features: Vec<ZoneFeatures> =
            zones.iter().filter_map(|z| z.features.clone()).collect();

        // 2. Population statistics.
        let statistics = stats::compute_statistics(&features);

        // 3. Hypothesis tests.
        let hypothesis_tests = self.hypotheses.run_all_tests(&features);

        // 4. Sequence analysis.
        let mut sequence_skipped_reason = None;
        let sequence_analysis = if features.len() >= MIN_ZONES_FOR_SEQUENCE {
            Some(sequence::analyze_transitions(&features))
        } else {
            sequence_skipped_reason = Some(format!(
                "sequence analysis needs at least {MIN_ZONES_FOR_SEQUENCE} zones, got {}",
                features.len()
            ));
            None
        };

        // 5. Clustering.
        let clustering = if options.perform_clustering && features.len() >= options.n_clusters {
            match clustering::cluster_zones(&features, options.n_clusters) {
                Ok(result) => Some(result),
                Err(err) => {
                    warnings.push(format!("clustering failed: {err}"));
                    None
                }
            }
        } else {
            None
        };

        // 6. Regression.
        let regression_results = if options.run_regression && zones.len() > MIN_ZONES_FOR_REGRESSION
        {
            Some(regression::run_regressions(&features))
        } else {
            None
        };

        // 7. Validation is an external collaborator; only record the request.
        let validation_results =
            if options.run_validation && zones.len() > MIN_ZONES_FOR_VALIDATION {
                info!("validation requested but not executed (external suite required)");
                Some(ValidationOutcome::requested_not_executed())
            } else {
                None
            };

        let mut zone_types: Vec<String> = zones.iter().map(|z| z.zone_type.clone()).collect();
        zone_types.sort();
        zone_types.dedup();

        let clustering_performed = clustering.is_some();
        let regression_performed = regression_results.is_some();
        info!(
            zones = zones.len(),
            clustering = clustering_performed,
            regression = regression_performed,
            "analysis complete"
        );

        Ok(ZoneAnalysisResult {
            metadata: AnalysisMetadata {
                analysis_timestamp: Utc::now().naive_utc(),
                total_zones: zones.len(),
                zone_types,
                n_bars: df.height(),
                n_columns: df.width(),
                clustering_performed,
                regression_performed,
                sequence_skipped_reason,
                warnings,
                config: None,
            },
            zones,
            statistics,
            hypothesis_tests,
            clustering,
            sequence_analysis,
            regression_results,
            validation_results,
            data: Some(df.clone()),
        })
    }
}

fn empty_result(df: &DataFrame, warnings: Vec<String>) -> ZoneAnalysisResult {
    ZoneAnalysisResult {
        zones: Vec::new(),
        statistics: stats::ZoneStatistics::default(),
        hypothesis_tests: hypothesis::HypothesisTestReport::default(),
        clustering: None,
        sequence_analysis: None,
        regression_results: None,
        validation_results: None,
        data: Some(df.clone()),
        metadata: AnalysisMetadata {
            analysis_timestamp: Utc::now().naive_utc(),
            total_zones: 0,
            zone_types: Vec::new(),
            n_bars: df.height(),
            n_columns: df.width(),
            clustering_performed: false,
            regression_performed: false,
            sequence_skipped_reason: None,
            warnings,
            config: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TIME_COL;
    use crate::detect::{DetectionStrategy, ZoneDetectionConfig};
    use crate::features::{StrategyNames, SwingConfig};
    use chrono::NaiveDate;
    use polars::prelude::*;

    fn analyzer() -> UniversalZoneAnalyzer {
        let extractor =
            ZoneFeatureExtractor::new(&StrategyNames::default(), &SwingConfig::default(), 2)
                .unwrap();
        UniversalZoneAnalyzer::new(extractor)
    }

    fn oscillating_frame(n: usize, half_period: usize) -> DataFrame {
        let times: Vec<chrono::NaiveDateTime> = (0..n)
            .map(|h| {
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(h as i64)
            })
            .collect();
        let close: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 3.0).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let osc: Vec<f64> = (0..n)
            .map(|i| if (i / half_period) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        df! {
            TIME_COL => &times,
            "open" => &close,
            "high" => &high,
            "low" => &low,
            "close" => &close,
            "osc" => &osc,
        }
        .unwrap()
    }

    fn detect(df: &DataFrame) -> Vec<crate::models::ZoneInfo> {
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
        crate::detect::zero_crossing::ZeroCrossingDetection
            .detect_zones(df, &config)
            .unwrap()
            .zones
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let df = oscillating_frame(10, 5);
        let result = analyzer()
            .analyze_zones(Vec::new(), &df, &AnalysisOptions::default(), Vec::new())
            .unwrap();
        assert_eq!(result.metadata.total_zones, 0);
        assert!(result.zones.is_empty());
        assert_eq!(result.statistics.total_zones, 0);
        assert!(result.clustering.is_none());
    }

    #[test]
    fn features_attached_and_ordered() {
        let df = oscillating_frame(60, 6);
        let zones = detect(&df);
        assert!(zones.len() >= 5);
        let result = analyzer()
            .analyze_zones(zones, &df, &AnalysisOptions::default(), Vec::new())
            .unwrap();
        for pair in result.zones.windows(2) {
            assert!(pair[1].start_idx > pair[0].end_idx);
        }
        for zone in &result.zones {
            let features = zone.features.as_ref().unwrap();
            assert_eq!(features.duration, zone.duration);
            assert_eq!(features.zone_id, zone.zone_id);
        }
    }

    #[test]
    fn sequence_needs_three_zones() {
        let df = oscillating_frame(20, 10);
        let zones = detect(&df);
        assert_eq!(zones.len(), 2);
        let result = analyzer()
            .analyze_zones(zones, &df, &AnalysisOptions::default(), Vec::new())
            .unwrap();
        assert!(result.sequence_analysis.is_none());
        assert!(result
            .metadata
            .sequence_skipped_reason
            .as_ref()
            .unwrap()
            .contains("at least 3"));
    }

    #[test]
    fn clustering_respects_gate_and_flag() {
        let df = oscillating_frame(60, 6);
        let zones = detect(&df);
        let options = AnalysisOptions {
            perform_clustering: false,
            ..AnalysisOptions::default()
        };
        let result = analyzer()
            .analyze_zones(zones.clone(), &df, &options, Vec::new())
            .unwrap();
        assert!(result.clustering.is_none());
        assert!(!result.metadata.clustering_performed);

        let result = analyzer()
            .analyze_zones(zones, &df, &AnalysisOptions::default(), Vec::new())
            .unwrap();
        assert!(result.clustering.is_some());
        assert!(result.metadata.clustering_performed);
    }

    #[test]
    fn regression_needs_more_than_ten_zones() {
        let df = oscillating_frame(44, 2);
        let zones = detect(&df);
        assert!(zones.len() > MIN_ZONES_FOR_REGRESSION);
        let options = AnalysisOptions {
            run_regression: true,
            ..AnalysisOptions::default()
        };
        let result = analyzer()
            .analyze_zones(zones, &df, &options, Vec::new())
            .unwrap();
        assert!(result.regression_results.is_some());
        assert!(result.metadata.regression_performed);
    }

    #[test]
    fn validation_records_request_without_executing() {
        let df = oscillating_frame(100, 2);
        let zones = detect(&df);
        assert!(zones.len() > MIN_ZONES_FOR_VALIDATION);
        let options = AnalysisOptions {
            run_validation: true,
            ..AnalysisOptions::default()
        };
        let result = analyzer()
            .analyze_zones(zones, &df, &options, Vec::new())
            .unwrap();
        let validation = result.validation_results.unwrap();
        assert!(validation.requested);
        assert!(!validation.executed);
    }

    #[test]
    fn statistics_cover_both_types() {
        let df = oscillating_frame(60, 6);
        let zones = detect(&df);
        let result = analyzer()
            .analyze_zones(zones, &df, &AnalysisOptions::default(), Vec::new())
            .unwrap();
        assert_eq!(result.metadata.zone_types, vec!["bear", "bull"]);
        assert!(result.statistics.zones_per_type["bull"] > 0);
        assert!(result.statistics.zones_per_type["bear"] > 0);
        assert!(result.statistics.duration.is_some());
    }
}

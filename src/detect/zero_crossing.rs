//! Zero-crossing detection: bull/bear zones from the sign of one oscillator
//! column (MACD histogram, Awesome Oscillator, CCI, ...).

use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use super::{zones_from_classes, Detection, DetectionStrategy, ZoneDetectionConfig};
use crate::data;
use crate::errors::ZoneError;
use crate::models::IndicatorContext;

/// Rules:
/// - `indicator_col` (required): oscillator column name.
/// - `smooth_window` (optional): centered rolling-mean window applied before
///   sign extraction.
///
/// A bar is `bull` when the indicator is greater than zero and `bear` when
/// below; exact zero counts as positive.
#[derive(Debug)]
pub struct ZeroCrossingDetection;

impl DetectionStrategy for ZeroCrossingDetection {
    fn name(&self) -> &'static str {
        "zero_crossing"
    }

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError> {
        config.validate_required(&["indicator_col"])?;
        let indicator_col = config
            .rule_str("indicator_col")?
            .ok_or_else(|| ZoneError::Configuration("rule 'indicator_col' must be a string".into()))?
            .to_string();

        let mut values = data::column_to_f64(df, &indicator_col)?;
        let times = data::timestamps(df)?;

        if let Some(window) = config.rule_usize("smooth_window")? {
            if window > 1 {
                values = centered_rolling_mean(&values, window);
                debug!(window, "applied smoothing before sign extraction");
            }
        }

        let mut warnings = Vec::new();
        let nan_count = values.iter().filter(|v| v.is_nan()).count();
        if nan_count > 0 {
            let msg = format!("indicator '{indicator_col}' has {nan_count} NaN gaps");
            warn!("{msg}");
            warnings.push(msg);
        }

        let classes: Vec<Option<String>> = values
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    None
                } else if v >= 0.0 {
                    Some("bull".to_string())
                } else {
                    Some("bear".to_string())
                }
            })
            .collect();

        let zones = zones_from_classes(df, &times, &classes, config, |_| IndicatorContext {
            detection_indicator: Some(indicator_col.clone()),
            detection_rules: config.rules.clone(),
            ..IndicatorContext::new("zero_crossing")
        })?;

        info!(
            total = zones.len(),
            bull = zones.iter().filter(|z| z.zone_type == "bull").count(),
            bear = zones.iter().filter(|z| z.zone_type == "bear").count(),
            "zero-crossing detection complete"
        );

        Ok(Detection { zones, warnings })
    }
}

/// Centered rolling mean over the in-bounds part of the window, so the edges
/// stay defined and no NaN head is introduced.
fn centered_rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let slice = &values[lo..hi];
            let valid: Vec<f64> = slice.iter().copied().filter(|v| !v.is_nan()).collect();
            if valid.is_empty() {
                f64::NAN
            } else {
                valid.iter().sum::<f64>() / valid.len() as f64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TIME_COL;
    use chrono::NaiveDate;
    use polars::prelude::*;

    fn frame_with_osc(osc: &[f64]) -> DataFrame {
        let times: Vec<chrono::NaiveDateTime> = (0..osc.len())
            .map(|h| {
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(h as i64)
            })
            .collect();
        let constant = vec![100.0; osc.len()];
        df! {
            TIME_COL => &times,
            "open" => &constant,
            "high" => &constant,
            "low" => &constant,
            "close" => &constant,
            "osc" => osc,
        }
        .unwrap()
    }

    fn detect(osc: &[f64], config: ZoneDetectionConfig) -> Detection {
        ZeroCrossingDetection
            .detect_zones(&frame_with_osc(osc), &config)
            .unwrap()
    }

    #[test]
    fn missing_rule_fails() {
        let df = frame_with_osc(&[1.0, -1.0]);
        let err = ZeroCrossingDetection
            .detect_zones(&df, &ZoneDetectionConfig::new("zero_crossing"))
            .unwrap_err();
        assert!(err.to_string().contains("indicator_col"));
    }

    #[test]
    fn missing_column_lists_available() {
        let df = frame_with_osc(&[1.0, -1.0]);
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "nope");
        let err = ZeroCrossingDetection.detect_zones(&df, &config).unwrap_err();
        assert!(err.to_string().contains("osc"));
    }

    #[test]
    fn alternating_signs_split_into_zones() {
        let osc = [1.0, 1.0, 1.0, -1.0, -1.0, 2.0, 2.0];
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
        let detection = detect(&osc, config);
        let zones = &detection.zones;
        assert_eq!(zones.len(), 3);
        assert_eq!(zones[0].zone_type, "bull");
        assert_eq!(zones[1].zone_type, "bear");
        assert_eq!(zones[2].zone_type, "bull");
        assert_eq!((zones[0].start_idx, zones[0].end_idx), (0, 2));
        assert_eq!((zones[1].start_idx, zones[1].end_idx), (3, 4));
        assert_eq!((zones[2].start_idx, zones[2].end_idx), (5, 6));
        let ids: Vec<usize> = zones.iter().map(|z| z.zone_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn zero_counts_as_positive() {
        let osc = [0.0, 1.0, -1.0, -1.0];
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
        let detection = detect(&osc, config);
        assert_eq!(detection.zones[0].zone_type, "bull");
        assert_eq!(detection.zones[0].start_idx, 0);
        assert_eq!(detection.zones[0].duration, 2);
    }

    #[test]
    fn short_runs_dropped_by_min_duration() {
        let osc = [1.0, -1.0, 1.0, 1.0, 1.0];
        let config = ZoneDetectionConfig::new("zero_crossing")
            .with_rule("indicator_col", "osc")
            .with_min_duration(2);
        let detection = detect(&osc, config);
        assert_eq!(detection.zones.len(), 1);
        assert_eq!(detection.zones[0].start_idx, 2);
    }

    #[test]
    fn zone_type_filter_applies() {
        let osc = [1.0, 1.0, -1.0, -1.0];
        let config = ZoneDetectionConfig::new("zero_crossing")
            .with_rule("indicator_col", "osc")
            .with_zone_types(["bear"]);
        let detection = detect(&osc, config);
        assert_eq!(detection.zones.len(), 1);
        assert_eq!(detection.zones[0].zone_type, "bear");
        assert_eq!(detection.zones[0].zone_id, 0);
    }

    #[test]
    fn nan_gap_breaks_runs_and_warns() {
        let osc = [1.0, 1.0, f64::NAN, 1.0, 1.0];
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
        let detection = detect(&osc, config);
        assert_eq!(detection.zones.len(), 2);
        assert_eq!(detection.warnings.len(), 1);
        assert!(detection.warnings[0].contains("NaN"));
    }

    #[test]
    fn context_documents_detection() {
        let osc = [1.0, 1.0, -2.0, -2.0];
        let config = ZoneDetectionConfig::new("zero_crossing").with_rule("indicator_col", "osc");
        let detection = detect(&osc, config);
        let ctx = &detection.zones[0].indicator_context;
        assert_eq!(ctx.detection_strategy, "zero_crossing");
        assert_eq!(ctx.detection_indicator.as_deref(), Some("osc"));
        assert!(ctx.signal_line.is_none());
        assert!(ctx.detection_rules.contains_key("indicator_col"));
    }

    #[test]
    fn smoothing_flattens_single_bar_flip() {
        // One -0.1 bar between strong positives smooths back above zero.
        let osc = [1.0, 1.0, -0.1, 1.0, 1.0];
        let config = ZoneDetectionConfig::new("zero_crossing")
            .with_rule("indicator_col", "osc")
            .with_rule("smooth_window", 3i64);
        let detection = detect(&osc, config);
        assert_eq!(detection.zones.len(), 1);
        assert_eq!(detection.zones[0].duration, 5);
    }

    #[test]
    fn centered_mean_handles_edges() {
        let out = centered_rolling_mean(&[3.0, 6.0, 9.0], 3);
        assert!((out[0] - 4.5).abs() < 1e-12);
        assert!((out[1] - 6.0).abs() < 1e-12);
        assert!((out[2] - 7.5).abs() < 1e-12);
    }
}

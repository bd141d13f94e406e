//! Threshold detection: overbought/neutral/oversold zones from one bounded
//! oscillator (RSI, Stochastic, Williams %R, ...).

use polars::prelude::DataFrame;
use tracing::{info, warn};

use super::{zones_from_classes, Detection, DetectionStrategy, ZoneDetectionConfig};
use crate::data;
use crate::errors::ZoneError;
use crate::models::{IndicatorContext, ThresholdPair};

/// Rules:
/// - `indicator_col` (required)
/// - `upper_threshold` (required)
/// - `lower_threshold` (required), with `upper > lower`
///
/// Classes: `overbought` above upper, `oversold` below lower, `neutral`
/// inside `[lower, upper]`.
#[derive(Debug)]
pub struct ThresholdDetection;

impl DetectionStrategy for ThresholdDetection {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError> {
        config.validate_required(&["indicator_col", "upper_threshold", "lower_threshold"])?;
        let indicator_col = config
            .rule_str("indicator_col")?
            .ok_or_else(|| ZoneError::Configuration("rule 'indicator_col' must be a string".into()))?
            .to_string();
        let upper = config.rule_f64("upper_threshold")?.expect("validated");
        let lower = config.rule_f64("lower_threshold")?.expect("validated");

        if upper <= lower {
            return Err(ZoneError::Configuration(format!(
                "upper_threshold ({upper}) must be > lower_threshold ({lower})"
            )));
        }

        let values = data::column_to_f64(df, &indicator_col)?;
        let times = data::timestamps(df)?;

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
                } else if v > upper {
                    Some("overbought".to_string())
                } else if v < lower {
                    Some("oversold".to_string())
                } else {
                    Some("neutral".to_string())
                }
            })
            .collect();

        let zones = zones_from_classes(df, &times, &classes, config, |_| IndicatorContext {
            detection_indicator: Some(indicator_col.clone()),
            thresholds: Some(ThresholdPair { upper, lower }),
            detection_rules: config.rules.clone(),
            ..IndicatorContext::new("threshold")
        })?;

        info!(
            total = zones.len(),
            overbought = zones.iter().filter(|z| z.zone_type == "overbought").count(),
            neutral = zones.iter().filter(|z| z.zone_type == "neutral").count(),
            oversold = zones.iter().filter(|z| z.zone_type == "oversold").count(),
            "threshold detection complete"
        );

        Ok(Detection { zones, warnings })
    }
}

//! Line-crossing detection: bull/bear zones from the dominance of one line
//! over another (MA crosses, price vs MA, band touches).

use polars::prelude::DataFrame;
use tracing::{info, warn};

use super::{zones_from_classes, Detection, DetectionStrategy, ZoneDetectionConfig};
use crate::data;
use crate::errors::ZoneError;
use crate::models::IndicatorContext;

/// Rules:
/// - `line1_col` (required): the fast line.
/// - `line2_col` (required): the slow line.
///
/// A bar is `bull` when `line1 > line2`, `bear` when below. Exact equality
/// inherits the previous bar's class (`bull` when it is the first bar).
#[derive(Debug)]
pub struct LineCrossingDetection;

impl DetectionStrategy for LineCrossingDetection {
    fn name(&self) -> &'static str {
        "line_crossing"
    }

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError> {
        config.validate_required(&["line1_col", "line2_col"])?;
        let line1_col = config
            .rule_str("line1_col")?
            .ok_or_else(|| ZoneError::Configuration("rule 'line1_col' must be a string".into()))?
            .to_string();
        let line2_col = config
            .rule_str("line2_col")?
            .ok_or_else(|| ZoneError::Configuration("rule 'line2_col' must be a string".into()))?
            .to_string();

        let line1 = data::column_to_f64(df, &line1_col)?;
        let line2 = data::column_to_f64(df, &line2_col)?;
        let times = data::timestamps(df)?;

        let mut warnings = Vec::new();
        let nan_count = line1
            .iter()
            .zip(line2.iter())
            .filter(|(a, b)| a.is_nan() || b.is_nan())
            .count();
        if nan_count > 0 {
            let msg =
                format!("lines '{line1_col}'/'{line2_col}' have {nan_count} NaN gaps");
            warn!("{msg}");
            warnings.push(msg);
        }

        let mut classes: Vec<Option<String>> = Vec::with_capacity(line1.len());
        let mut previous: Option<String> = None;
        for (&a, &b) in line1.iter().zip(line2.iter()) {
            let class = if a.is_nan() || b.is_nan() {
                None
            } else if a > b {
                Some("bull".to_string())
            } else if a < b {
                Some("bear".to_string())
            } else {
                Some(previous.clone().unwrap_or_else(|| "bull".to_string()))
            };
            previous.clone_from(&class);
            classes.push(class);
        }

        let zones = zones_from_classes(df, &times, &classes, config, |_| IndicatorContext {
            detection_indicator: Some(line1_col.clone()),
            signal_line: Some(line2_col.clone()),
            detection_rules: config.rules.clone(),
            ..IndicatorContext::new("line_crossing")
        })?;

        info!(total = zones.len(), "line-crossing detection complete");

        Ok(Detection { zones, warnings })
    }
}

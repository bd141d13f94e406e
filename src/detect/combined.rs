//! Combined-rules detection: zones where a boolean combination of per-bar
//! conditions holds.

use polars::prelude::DataFrame;
use tracing::info;

use super::{
    zones_from_classes, Detection, DetectionStrategy, Predicate, RuleValue, ZoneDetectionConfig,
    ZoneTypeMap,
};
use crate::data;
use crate::errors::ZoneError;
use crate::models::IndicatorContext;

/// Rules:
/// - `conditions` (required): list of [`Predicate`]s evaluated per bar.
/// - `logic` (optional): `"AND"` (default) or `"OR"`.
/// - `zone_type_map` (optional): labels for true/false runs, default
///   `active`/`inactive`.
///
/// Predicates combine elementwise under the chosen logic; the boolean vector
/// is run-length encoded like every other strategy.
#[derive(Debug)]
pub struct CombinedRulesDetection;

impl DetectionStrategy for CombinedRulesDetection {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError> {
        config.validate_required(&["conditions"])?;

        let conditions = match config.rules.get("conditions") {
            Some(RuleValue::Predicates(preds)) => preds,
            Some(other) => {
                return Err(ZoneError::Configuration(format!(
                    "rule 'conditions' must be a predicate list, got {other:?}"
                )))
            }
            None => unreachable!("validated above"),
        };
        if conditions.is_empty() {
            return Err(ZoneError::Configuration(
                "rule 'conditions' must contain at least one predicate".into(),
            ));
        }

        let logic = config.rule_str("logic")?.unwrap_or("AND").to_uppercase();
        if logic != "AND" && logic != "OR" {
            return Err(ZoneError::Configuration(format!(
                "logic must be 'AND' or 'OR', got '{logic}'"
            )));
        }

        let type_map = match config.rules.get("zone_type_map") {
            Some(RuleValue::TypeMap(map)) => map.clone(),
            Some(other) => {
                return Err(ZoneError::Configuration(format!(
                    "rule 'zone_type_map' must be a type map, got {other:?}"
                )))
            }
            None => ZoneTypeMap::default(),
        };

        let mut combined: Option<Vec<bool>> = None;
        for (i, predicate) in conditions.iter().enumerate() {
            let values = predicate.evaluate(df).map_err(|e| {
                ZoneError::Configuration(format!("error evaluating condition {i}: {e}"))
            })?;
            combined = Some(match combined {
                None => values,
                Some(acc) => acc
                    .iter()
                    .zip(values.iter())
                    .map(|(&a, &b)| if logic == "AND" { a && b } else { a || b })
                    .collect(),
            });
        }
        let combined = combined.expect("at least one condition");

        let times = data::timestamps(df)?;
        let classes: Vec<Option<String>> = combined
            .iter()
            .map(|&active| {
                Some(if active {
                    type_map.active.clone()
                } else {
                    type_map.inactive.clone()
                })
            })
            .collect();

        // Rules echo excludes `conditions`: custom predicates may wrap
        // closures that cannot be serialized.
        let echo_rules: std::collections::BTreeMap<String, RuleValue> = config
            .rules
            .iter()
            .filter(|(k, _)| k.as_str() != "conditions")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let zones = zones_from_classes(df, &times, &classes, config, |_| IndicatorContext {
            logic: Some(logic.clone()),
            num_conditions: Some(conditions.len()),
            detection_rules: echo_rules.clone(),
            ..IndicatorContext::new("combined")
        })?;

        info!(total = zones.len(), %logic, "combined-rules detection complete");

        Ok(Detection {
            zones,
            warnings: Vec::new(),
        })
    }
}

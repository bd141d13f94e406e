//! Detection strategy registry: a static catalog of built-in strategies plus
//! a process-wide table for custom registrations.
//!
//! Registration is expected at startup, before any pipeline run.
//! Re-registering a name logs a warning and replaces the entry (last writer
//! wins).

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::warn;

use super::combined::CombinedRulesDetection;
use super::line_crossing::LineCrossingDetection;
use super::preloaded::PreloadedZonesDetection;
use super::threshold::ThresholdDetection;
use super::zero_crossing::ZeroCrossingDetection;
use super::DetectionStrategy;
use crate::errors::ZoneError;

/// Metadata about a detection strategy for catalogs and error messages.
pub struct StrategyInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_zones: &'static [&'static str],
    pub required_rules: &'static [&'static str],
}

pub const STRATEGY_CATALOG: &[StrategyInfo] = &[
    StrategyInfo {
        name: "zero_crossing",
        description: "Detect bull/bear zones by an indicator crossing the zero line",
        supported_zones: &["bull", "bear"],
        required_rules: &["indicator_col"],
    },
    StrategyInfo {
        name: "threshold",
        description: "Detect zones by an indicator crossing upper/lower thresholds",
        supported_zones: &["overbought", "neutral", "oversold"],
        required_rules: &["indicator_col", "upper_threshold", "lower_threshold"],
    },
    StrategyInfo {
        name: "line_crossing",
        description: "Detect zones by two lines crossing each other",
        supported_zones: &["bull", "bear"],
        required_rules: &["line1_col", "line2_col"],
    },
    StrategyInfo {
        name: "preloaded",
        description: "Import zones from an external source (CSV file or in-memory rows)",
        supported_zones: &["any"],
        required_rules: &["zones_data"],
    },
    StrategyInfo {
        name: "combined",
        description: "Detect zones by combining multiple conditions with AND/OR logic",
        supported_zones: &["custom"],
        required_rules: &["conditions"],
    },
];

type StrategyCtor = Arc<dyn Fn() -> Box<dyn DetectionStrategy> + Send + Sync>;

fn custom_registry() -> &'static DashMap<String, StrategyCtor> {
    static REGISTRY: OnceLock<DashMap<String, StrategyCtor>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Register a custom strategy constructor under `name`.
pub fn register_strategy<F>(name: &str, ctor: F)
where
    F: Fn() -> Box<dyn DetectionStrategy> + Send + Sync + 'static,
{
    let registry = custom_registry();
    if registry.contains_key(name) || STRATEGY_CATALOG.iter().any(|s| s.name == name) {
        warn!(strategy = name, "overwriting existing detection strategy");
    }
    registry.insert(name.to_string(), Arc::new(ctor));
}

/// Metadata for a built-in strategy, if `name` is one.
pub fn strategy_info(name: &str) -> Option<&'static StrategyInfo> {
    STRATEGY_CATALOG.iter().find(|s| s.name == name)
}

/// Names of every known strategy: custom registrations shadow built-ins.
pub fn list_strategies() -> Vec<String> {
    let mut names: Vec<String> = STRATEGY_CATALOG.iter().map(|s| s.name.to_string()).collect();
    for entry in custom_registry().iter() {
        if !names.iter().any(|n| n == entry.key()) {
            names.push(entry.key().clone());
        }
    }
    names
}

/// Build a detector by name. Custom registrations take precedence so callers
/// can replace a built-in. Unknown names fail listing the alternatives.
pub fn build_detector(name: &str) -> Result<Box<dyn DetectionStrategy>, ZoneError> {
    if let Some(ctor) = custom_registry().get(name) {
        return Ok(ctor.value()());
    }
    match name {
        "zero_crossing" => Ok(Box::new(ZeroCrossingDetection)),
        "threshold" => Ok(Box::new(ThresholdDetection)),
        "line_crossing" => Ok(Box::new(LineCrossingDetection)),
        "preloaded" => Ok(Box::new(PreloadedZonesDetection)),
        "combined" => Ok(Box::new(CombinedRulesDetection)),
        _ => Err(ZoneError::Configuration(format!(
            "unknown zone detection strategy: '{name}'. Available: {}",
            list_strategies().join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, ZoneDetectionConfig};
    use polars::prelude::DataFrame;

    #[test]
    fn catalog_has_all_builtins() {
        assert_eq!(STRATEGY_CATALOG.len(), 5);
        for info in STRATEGY_CATALOG {
            assert!(!info.required_rules.is_empty());
        }
    }

    #[test]
    fn build_detector_known_names() {
        for info in STRATEGY_CATALOG {
            let detector = build_detector(info.name).unwrap();
            assert_eq!(detector.name(), info.name);
        }
    }

    #[test]
    fn unknown_strategy_lists_alternatives() {
        let err = build_detector("fancy_zones").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("fancy_zones"));
        assert!(msg.contains("zero_crossing"));
        assert!(msg.contains("preloaded"));
    }

    #[test]
    fn custom_registration_resolves() {
        struct NullStrategy;
        impl crate::detect::DetectionStrategy for NullStrategy {
            fn name(&self) -> &'static str {
                "null"
            }
            fn detect_zones(
                &self,
                _df: &DataFrame,
                _config: &ZoneDetectionConfig,
            ) -> Result<Detection, crate::errors::ZoneError> {
                Ok(Detection::default())
            }
        }
        register_strategy("null_test_strategy", || Box::new(NullStrategy));
        let detector = build_detector("null_test_strategy").unwrap();
        assert_eq!(detector.name(), "null");
        assert!(list_strategies().iter().any(|n| n == "null_test_strategy"));
    }
}

//! Discoverable indicator library catalog.
//!
//! The `library` source exposes the rust_ti-backed catalog behind a runtime
//! discovery surface. Setting `ZONELAB_SKIP_RUST_TI` disables it: the catalog
//! then contributes zero indicators and discovery proceeds without error;
//! only an explicit `create` for a library indicator fails.

use std::collections::BTreeMap;

use tracing::info;

use super::{custom, Indicator};
use crate::errors::ZoneError;

/// Env flag disabling the rust_ti-backed library catalog.
pub const SKIP_ENV: &str = "ZONELAB_SKIP_RUST_TI";

pub struct IndicatorInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static str,
}

const CATALOG: &[IndicatorInfo] = &[
    IndicatorInfo {
        name: "macd",
        description: "MACD line, signal line, and histogram",
        params: "fast_period (12), slow_period (26), signal_period (9)",
    },
    IndicatorInfo {
        name: "rsi",
        description: "Relative Strength Index",
        params: "period (14)",
    },
    IndicatorInfo {
        name: "sma",
        description: "Simple moving average of close",
        params: "period (20)",
    },
    IndicatorInfo {
        name: "ema",
        description: "Exponential moving average of close",
        params: "period (20)",
    },
    IndicatorInfo {
        name: "ao",
        description: "Awesome Oscillator over bar midprice",
        params: "fast (5), slow (34)",
    },
    IndicatorInfo {
        name: "atr",
        description: "Average True Range",
        params: "period (14)",
    },
    IndicatorInfo {
        name: "bollinger",
        description: "Bollinger bands (SMA center, stddev bands)",
        params: "period (20), multiplier (2.0)",
    },
];

pub fn is_enabled() -> bool {
    match std::env::var(SKIP_ENV) {
        Ok(v) => v == "0" || v.is_empty(),
        Err(_) => true,
    }
}

/// The discoverable catalog. Empty when the library is disabled.
pub fn list_indicators() -> Vec<&'static IndicatorInfo> {
    if !is_enabled() {
        info!("indicator library disabled via {SKIP_ENV}");
        return Vec::new();
    }
    CATALOG.iter().collect()
}

pub(crate) fn build(
    name: &str,
    params: &BTreeMap<String, f64>,
) -> Result<Box<dyn Indicator>, ZoneError> {
    if !is_enabled() {
        return Err(ZoneError::Indicator(format!(
            "indicator library is disabled via {SKIP_ENV}; cannot create '{name}'"
        )));
    }
    if !CATALOG.iter().any(|i| i.name == name) {
        return Err(ZoneError::Configuration(format!(
            "unknown library indicator '{name}'. Available: {}",
            CATALOG
                .iter()
                .map(|i| i.name)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    custom::build(name, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_known_indicators() {
        // Default environment: the library is enabled.
        if is_enabled() {
            let names: Vec<&str> = list_indicators().iter().map(|i| i.name).collect();
            assert!(names.contains(&"macd"));
            assert!(names.contains(&"rsi"));
        }
    }

    #[test]
    fn unknown_library_indicator_fails() {
        if is_enabled() {
            let err = build("supertrend", &BTreeMap::new()).unwrap_err();
            assert!(err.to_string().contains("supertrend"));
        }
    }
}

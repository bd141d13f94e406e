//! Convenience wrappers for common indicator-plus-strategy combinations.
//!
//! Each preset translates a small parameter set into builder calls and
//! performs no analysis of its own.

use polars::prelude::DataFrame;

use crate::analysis::AnalysisOptions;
use crate::detect::ZonesSource;
use crate::errors::ZoneError;
use crate::indicators::IndicatorSource;
use crate::models::ZoneAnalysisResult;
use crate::pipeline::builder::analyze_zones;
use crate::pipeline::cache::DEFAULT_CACHE_TTL_SECS;

#[derive(Debug, Clone)]
pub struct MacdZonesPreset {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub min_duration: usize,
    pub smooth_window: Option<usize>,
    pub clustering: bool,
    pub n_clusters: usize,
    pub regression: bool,
    pub enable_cache: bool,
    pub cache_ttl: u64,
}

impl Default for MacdZonesPreset {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
            min_duration: 2,
            smooth_window: None,
            clustering: true,
            n_clusters: 3,
            regression: false,
            enable_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// MACD histogram zones via the zero-crossing strategy.
pub fn analyze_macd_zones(
    df: &DataFrame,
    preset: &MacdZonesPreset,
) -> Result<ZoneAnalysisResult, ZoneError> {
    let mut builder = analyze_zones(df)
        .with_indicator(
            IndicatorSource::Custom,
            "macd",
            &[
                ("fast_period", preset.fast as f64),
                ("slow_period", preset.slow as f64),
                ("signal_period", preset.signal as f64),
            ],
        )
        .detect_zones("zero_crossing")
        .rule("indicator_col", "macd_hist")
        .min_duration(preset.min_duration)
        .analyze(AnalysisOptions {
            perform_clustering: preset.clustering,
            n_clusters: preset.n_clusters,
            run_regression: preset.regression,
            run_validation: false,
        })
        .with_cache(preset.enable_cache)
        .cache_ttl(preset.cache_ttl);
    if let Some(window) = preset.smooth_window {
        builder = builder.rule("smooth_window", window as i64);
    }
    builder.build()
}

#[derive(Debug, Clone)]
pub struct RsiZonesPreset {
    pub period: usize,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    pub min_duration: usize,
    pub clustering: bool,
    pub n_clusters: usize,
    pub regression: bool,
    pub enable_cache: bool,
    pub cache_ttl: u64,
}

impl Default for RsiZonesPreset {
    fn default() -> Self {
        Self {
            period: 14,
            upper_threshold: 70.0,
            lower_threshold: 30.0,
            min_duration: 2,
            clustering: true,
            n_clusters: 3,
            regression: false,
            enable_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// RSI overbought/oversold zones via the threshold strategy.
pub fn analyze_rsi_zones(
    df: &DataFrame,
    preset: &RsiZonesPreset,
) -> Result<ZoneAnalysisResult, ZoneError> {
    analyze_zones(df)
        .with_indicator(
            IndicatorSource::Custom,
            "rsi",
            &[("period", preset.period as f64)],
        )
        .detect_zones("threshold")
        .rule("indicator_col", format!("rsi_{}", preset.period))
        .rule("upper_threshold", preset.upper_threshold)
        .rule("lower_threshold", preset.lower_threshold)
        .min_duration(preset.min_duration)
        .zone_types(["overbought", "neutral", "oversold"])
        .analyze(AnalysisOptions {
            perform_clustering: preset.clustering,
            n_clusters: preset.n_clusters,
            run_regression: preset.regression,
            run_validation: false,
        })
        .with_cache(preset.enable_cache)
        .cache_ttl(preset.cache_ttl)
        .build()
}

#[derive(Debug, Clone)]
pub struct AoZonesPreset {
    pub fast: usize,
    pub slow: usize,
    pub min_duration: usize,
    pub smooth_window: Option<usize>,
    pub clustering: bool,
    pub n_clusters: usize,
    pub regression: bool,
    pub enable_cache: bool,
    pub cache_ttl: u64,
}

impl Default for AoZonesPreset {
    fn default() -> Self {
        Self {
            fast: 5,
            slow: 34,
            min_duration: 2,
            smooth_window: None,
            clustering: true,
            n_clusters: 3,
            regression: false,
            enable_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Awesome Oscillator zones via the zero-crossing strategy.
pub fn analyze_ao_zones(
    df: &DataFrame,
    preset: &AoZonesPreset,
) -> Result<ZoneAnalysisResult, ZoneError> {
    let mut builder = analyze_zones(df)
        .with_indicator(
            IndicatorSource::Custom,
            "ao",
            &[("fast", preset.fast as f64), ("slow", preset.slow as f64)],
        )
        .detect_zones("zero_crossing")
        .rule("indicator_col", format!("ao_{}_{}", preset.fast, preset.slow))
        .min_duration(preset.min_duration)
        .analyze(AnalysisOptions {
            perform_clustering: preset.clustering,
            n_clusters: preset.n_clusters,
            run_regression: preset.regression,
            run_validation: false,
        })
        .with_cache(preset.enable_cache)
        .cache_ttl(preset.cache_ttl);
    if let Some(window) = preset.smooth_window {
        builder = builder.rule("smooth_window", window as i64);
    }
    builder.build()
}

#[derive(Debug, Clone)]
pub struct PreloadedZonesPreset {
    pub time_tolerance: String,
    pub min_duration: usize,
    pub clustering: bool,
    pub n_clusters: usize,
    pub enable_cache: bool,
    pub cache_ttl: u64,
}

impl Default for PreloadedZonesPreset {
    fn default() -> Self {
        Self {
            time_tolerance: "1min".to_string(),
            min_duration: 2,
            clustering: true,
            n_clusters: 3,
            enable_cache: true,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Externally produced zones merged onto the table and analyzed.
pub fn analyze_preloaded_zones(
    df: &DataFrame,
    zones_data: ZonesSource,
    preset: &PreloadedZonesPreset,
) -> Result<ZoneAnalysisResult, ZoneError> {
    analyze_zones(df)
        .detect_zones("preloaded")
        .rule("zones_data", zones_data)
        .rule("time_tolerance", preset.time_tolerance.as_str())
        .min_duration(preset.min_duration)
        .zone_types(["any"])
        .analyze(AnalysisOptions {
            perform_clustering: preset.clustering,
            n_clusters: preset.n_clusters,
            run_regression: false,
            run_validation: false,
        })
        .with_cache(preset.enable_cache)
        .cache_ttl(preset.cache_ttl)
        .build()
}

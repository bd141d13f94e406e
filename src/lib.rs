#![allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

//! Zone analysis engine for OHLCV time series.
//!
//! Given a bar table plus derived indicator columns, the engine detects
//! contiguous zones where a rule over the indicator holds, extracts per-zone
//! features through pluggable analytical strategies, runs population
//! statistics, and caches results keyed by input hash and configuration.

pub mod analysis;
pub mod data;
pub mod detect;
pub mod errors;
pub mod features;
pub mod indicators;
pub mod models;
pub mod pipeline;
pub mod presets;
pub mod swing;

pub use analysis::{AnalysisOptions, UniversalZoneAnalyzer};
pub use detect::{Predicate, RuleValue, ZoneDetectionConfig, ZonesSource};
pub use errors::{ErrorKind, ZoneError};
pub use features::{StrategyNames, SwingConfig, SwingScope, ZoneFeatureExtractor};
pub use indicators::{IndicatorConfig, IndicatorFactory, IndicatorSource};
pub use models::{
    SwingContext, SwingKind, SwingPoint, ZoneAnalysisResult, ZoneFeatures, ZoneInfo,
};
pub use pipeline::builder::analyze_zones;
pub use pipeline::cache::{CacheStore, MemoryCache, ZoneAnalysisCache, CACHE_VERSION};
pub use pipeline::{ZoneAnalysisConfig, ZoneAnalysisPipeline};

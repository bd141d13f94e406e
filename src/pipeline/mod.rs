//! End-to-end orchestration: indicator realization, detection, swing context,
//! analysis, and result caching.

pub mod builder;
pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use garde::Validate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::{AnalysisOptions, UniversalZoneAnalyzer};
use crate::data;
use crate::detect::{registry, DetectionStrategy, ZoneDetectionConfig};
use crate::errors::ZoneError;
use crate::features::{StrategyNames, SwingConfig, ZoneFeatureExtractor};
use crate::indicators::{custom, Indicator, IndicatorConfig, IndicatorFactory};
use crate::models::ZoneAnalysisResult;
use cache::{CacheStore, ZoneAnalysisCache};

/// Full configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ZoneAnalysisConfig {
    /// Indicator to realize before detection; `None` means the columns are
    /// already present in the input.
    #[garde(skip)]
    pub indicator: Option<IndicatorConfig>,
    #[garde(custom(validate_detection))]
    pub zone_detection: ZoneDetectionConfig,
    #[garde(skip)]
    pub perform_clustering: bool,
    #[garde(range(min = 1))]
    pub n_clusters: usize,
    #[garde(skip)]
    pub run_regression: bool,
    #[garde(skip)]
    pub run_validation: bool,
    #[garde(skip)]
    pub strategies: StrategyNames,
    #[garde(custom(validate_swing))]
    pub swing: SwingConfig,
}

impl Default for ZoneAnalysisConfig {
    fn default() -> Self {
        Self {
            indicator: None,
            zone_detection: ZoneDetectionConfig::default(),
            perform_clustering: true,
            n_clusters: 3,
            run_regression: false,
            run_validation: false,
            strategies: StrategyNames::default(),
            swing: SwingConfig::default(),
        }
    }
}

fn validate_detection(config: &ZoneDetectionConfig, _ctx: &()) -> garde::Result {
    if config.strategy.is_empty() {
        return Err(garde::Error::new("zone_detection.strategy must be set"));
    }
    if config.min_duration == 0 {
        return Err(garde::Error::new("min_duration must be at least 1"));
    }
    if config.zone_types.is_empty() {
        return Err(garde::Error::new("zone_types must not be empty"));
    }
    Ok(())
}

fn validate_swing(config: &SwingConfig, _ctx: &()) -> garde::Result {
    if config.base_deviation <= 0.0 {
        return Err(garde::Error::new("swing.base_deviation must be positive"));
    }
    Ok(())
}

impl ZoneAnalysisConfig {
    fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            perform_clustering: self.perform_clustering,
            n_clusters: self.n_clusters,
            run_regression: self.run_regression,
            run_validation: self.run_validation,
        }
    }
}

/// Deterministic pipeline runner. Construction validates the configuration
/// and every referenced strategy name.
pub struct ZoneAnalysisPipeline {
    config: ZoneAnalysisConfig,
    analyzer: UniversalZoneAnalyzer,
    cache: Option<ZoneAnalysisCache>,
    cache_ttl: Option<Duration>,
    cache_disk: bool,
}

impl ZoneAnalysisPipeline {
    pub fn new(config: ZoneAnalysisConfig) -> Result<Self, ZoneError> {
        config
            .validate()
            .map_err(|report| ZoneError::Configuration(report.to_string()))?;
        // Fail on unknown detection strategies before any data arrives.
        registry::build_detector(&config.zone_detection.strategy)?;
        let extractor = ZoneFeatureExtractor::new(
            &config.strategies,
            &config.swing,
            config.zone_detection.min_duration,
        )?;
        Ok(Self {
            config,
            analyzer: UniversalZoneAnalyzer::new(extractor),
            cache: None,
            cache_ttl: None,
            cache_disk: false,
        })
    }

    /// Enable result caching against the given store.
    pub fn with_cache(
        mut self,
        store: Arc<dyn CacheStore>,
        ttl: Option<Duration>,
        disk: bool,
    ) -> Self {
        self.cache = Some(ZoneAnalysisCache::new(store));
        self.cache_ttl = ttl;
        self.cache_disk = disk;
        self
    }

    /// Override the cache wrapper (version control for upgrade tests).
    pub fn with_zone_cache(mut self, cache: ZoneAnalysisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ZoneAnalysisConfig {
        &self.config
    }

    /// The cache key this pipeline would use for the given input.
    pub fn cache_key_for(&self, df: &DataFrame) -> Result<String, ZoneError> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| ZoneError::Cache("caching is not enabled".into()))?;
        let data_hash = ZoneAnalysisCache::compute_data_hash(df)?;
        let config_signature = ZoneAnalysisCache::config_signature(&self.config)?;
        let swing_signature = ZoneAnalysisCache::swing_signature(&self.config)?;
        Ok(cache.generate_cache_key(&data_hash, &config_signature, &swing_signature))
    }

    /// Run the full pipeline: indicator realization, detection, optional
    /// global swing context, analysis, and result finalization.
    pub fn run(&self, df: &DataFrame) -> Result<ZoneAnalysisResult, ZoneError> {
        data::validate_ohlcv(df)?;

        // The cache key hashes the raw OHLC input, so it can be computed
        // before indicator realization.
        let cache_key = match &self.cache {
            Some(_) => Some(self.cache_key_for(df)?),
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(result) = cache.load(key) {
                info!(key = &key[..24.min(key.len())], "zone analysis result loaded from cache");
                return Ok(result);
            }
            info!("cache miss, running zone analysis");
        }

        let (prepared, mut warnings) = self.prepare_data(df)?;

        let detector = registry::build_detector(&self.config.zone_detection.strategy)?;
        let detection = detector.detect_zones(&prepared, &self.config.zone_detection)?;
        warnings.extend(detection.warnings);
        let mut zones = detection.zones;

        if let Some(context) = self.analyzer.extractor().build_global_context(&prepared)? {
            let shared = Arc::new(context);
            for zone in &mut zones {
                zone.swing_context = Some(Arc::clone(&shared));
            }
        }

        let mut result = self.analyzer.analyze_zones(
            zones,
            &prepared,
            &self.config.analysis_options(),
            warnings,
        )?;
        result.metadata.config = serde_json::to_value(&self.config).ok();

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Err(err) = cache.save(key, &result, self.cache_ttl, self.cache_disk) {
                warn!(%err, "failed to save analysis result to cache");
            }
        }

        Ok(result)
    }

    /// Realize the configured indicator and best-effort ATR into a working
    /// copy of the table.
    fn prepare_data(&self, df: &DataFrame) -> Result<(DataFrame, Vec<String>), ZoneError> {
        let mut working = df.clone();
        let mut warnings = Vec::new();

        if let Some(indicator_config) = &self.config.indicator {
            info!(
                source = ?indicator_config.source,
                name = %indicator_config.name,
                "calculating indicator"
            );
            let indicator = IndicatorFactory::create(indicator_config)?;
            let produced = indicator.calculate(&working)?;
            if !produced.columns.is_empty() && produced.data.height() != working.height() {
                return Err(ZoneError::Indicator(format!(
                    "indicator '{}' returned {} rows for {} input rows",
                    indicator_config.name,
                    produced.data.height(),
                    working.height()
                )));
            }
            for column in produced.data.columns() {
                working.with_column(column.clone())?;
            }
        }

        // ATR feeds normalization downstream; its absence is never fatal.
        let has_atr = data::column_names(&working).iter().any(|c| c == "atr");
        if !has_atr {
            match custom::build("atr", &std::collections::BTreeMap::new())
                .and_then(|indicator| indicator.calculate(&working))
            {
                Ok(produced) => {
                    for column in produced.data.columns() {
                        working.with_column(column.clone())?;
                    }
                }
                Err(err) => {
                    warnings.push(format!("failed to add ATR: {err}"));
                }
            }
        }

        Ok((working, warnings))
    }
}

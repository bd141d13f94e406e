//! Fluent entry point: `analyze_zones(df)` chains detection, strategies,
//! analysis flags, and caching into one pipeline run.

use std::sync::Arc;
use std::time::Duration;

use polars::prelude::DataFrame;

use super::cache::{global_cache, CacheStore, DEFAULT_CACHE_TTL_SECS};
use super::{ZoneAnalysisConfig, ZoneAnalysisPipeline};
use crate::analysis::AnalysisOptions;
use crate::detect::{RuleValue, ZoneDetectionConfig};
use crate::errors::ZoneError;
use crate::features::SwingScope;
use crate::indicators::{IndicatorConfig, IndicatorSource};
use crate::models::ZoneAnalysisResult;

/// Start a fluent zone analysis over the given table.
///
/// A minimal build needs only a detection setup:
///
/// ```no_run
/// # use polars::prelude::DataFrame;
/// # fn demo(df: &DataFrame) -> Result<(), zonelab::ZoneError> {
/// let result = zonelab::analyze_zones(df)
///     .detect_zones("zero_crossing")
///     .rule("indicator_col", "macd_hist")
///     .build()?;
/// # Ok(()) }
/// ```
pub fn analyze_zones(df: &DataFrame) -> ZoneAnalysisBuilder {
    ZoneAnalysisBuilder::new(df.clone())
}

pub struct ZoneAnalysisBuilder {
    data: DataFrame,
    indicator: Option<IndicatorConfig>,
    detection: Option<ZoneDetectionConfig>,
    options: AnalysisOptions,
    config: ZoneAnalysisConfig,
    enable_cache: bool,
    cache_ttl: Duration,
    cache_disk: bool,
    cache_store: Option<Arc<dyn CacheStore>>,
    misuse: Option<String>,
}

impl ZoneAnalysisBuilder {
    fn new(data: DataFrame) -> Self {
        Self {
            data,
            indicator: None,
            detection: None,
            options: AnalysisOptions::default(),
            config: ZoneAnalysisConfig::default(),
            enable_cache: true,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_disk: false,
            cache_store: None,
            misuse: None,
        }
    }

    /// Realize an indicator before detection.
    pub fn with_indicator(
        mut self,
        source: IndicatorSource,
        name: &str,
        params: &[(&str, f64)],
    ) -> Self {
        let mut config = IndicatorConfig::new(source, name);
        for (key, value) in params {
            config = config.with_param(key, *value);
        }
        self.indicator = Some(config);
        self
    }

    /// Configure the detection strategy. Rules follow via [`rule`].
    ///
    /// [`rule`]: ZoneAnalysisBuilder::rule
    pub fn detect_zones(mut self, strategy: &str) -> Self {
        self.detection = Some(ZoneDetectionConfig::new(strategy));
        self
    }

    /// Add one detection rule. Must follow [`detect_zones`].
    ///
    /// [`detect_zones`]: ZoneAnalysisBuilder::detect_zones
    pub fn rule(mut self, key: &str, value: impl Into<RuleValue>) -> Self {
        match self.detection.take() {
            Some(config) => self.detection = Some(config.with_rule(key, value)),
            None => {
                self.misuse
                    .get_or_insert_with(|| format!("rule('{key}') called before detect_zones()"));
            }
        }
        self
    }

    pub fn min_duration(mut self, min_duration: usize) -> Self {
        if let Some(config) = self.detection.take() {
            self.detection = Some(config.with_min_duration(min_duration));
        } else {
            self.misuse
                .get_or_insert_with(|| "min_duration() called before detect_zones()".to_string());
        }
        self
    }

    pub fn zone_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, types: I) -> Self {
        if let Some(config) = self.detection.take() {
            self.detection = Some(config.with_zone_types(types));
        } else {
            self.misuse
                .get_or_insert_with(|| "zone_types() called before detect_zones()".to_string());
        }
        self
    }

    // ── analytical strategies ────────────────────────────────────────────────

    pub fn with_swing_strategy(mut self, name: &str) -> Self {
        self.config.strategies.swing = Some(name.to_string());
        self
    }

    pub fn with_shape_strategy(mut self, name: &str) -> Self {
        self.config.strategies.shape = Some(name.to_string());
        self
    }

    pub fn with_divergence_strategy(mut self, name: &str) -> Self {
        self.config.strategies.divergence = Some(name.to_string());
        self
    }

    pub fn with_volatility_strategy(mut self, name: &str) -> Self {
        self.config.strategies.volatility = Some(name.to_string());
        self
    }

    pub fn with_volume_strategy(mut self, name: &str) -> Self {
        self.config.strategies.volume = Some(name.to_string());
        self
    }

    /// Use a named swing parameter preset (`default`, `narrow_zone`,
    /// `wide_zone`).
    pub fn with_swing_preset(mut self, preset: &str) -> Self {
        self.config.swing.preset = preset.to_string();
        self
    }

    pub fn with_swing_scope(mut self, scope: SwingScope) -> Self {
        self.config.swing.scope = scope;
        self
    }

    pub fn with_auto_thresholds(mut self, enabled: bool) -> Self {
        self.config.swing.auto_thresholds = enabled;
        self
    }

    // ── analysis flags ───────────────────────────────────────────────────────

    pub fn analyze(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }

    // ── caching ──────────────────────────────────────────────────────────────

    pub fn with_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl = Duration::from_secs(secs);
        self
    }

    pub fn cache_disk(mut self, disk: bool) -> Self {
        self.cache_disk = disk;
        self
    }

    /// Use a specific store instead of the process-wide default.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Execute the pipeline and return the result.
    pub fn build(self) -> Result<ZoneAnalysisResult, ZoneError> {
        if let Some(misuse) = self.misuse {
            return Err(ZoneError::Configuration(misuse));
        }
        let detection = self.detection.ok_or_else(|| {
            ZoneError::Configuration(
                "zone detection strategy not configured; call detect_zones() first".into(),
            )
        })?;

        let config = ZoneAnalysisConfig {
            indicator: self.indicator,
            zone_detection: detection,
            perform_clustering: self.options.perform_clustering,
            n_clusters: self.options.n_clusters,
            run_regression: self.options.run_regression,
            run_validation: self.options.run_validation,
            strategies: self.config.strategies,
            swing: self.config.swing,
        };

        let mut pipeline = ZoneAnalysisPipeline::new(config)?;
        if self.enable_cache {
            let store: Arc<dyn CacheStore> = match self.cache_store {
                Some(store) => store,
                None => global_cache(),
            };
            pipeline = pipeline.with_cache(store, Some(self.cache_ttl), self.cache_disk);
        }
        pipeline.run(&self.data)
    }
}

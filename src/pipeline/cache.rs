//! Content-addressed memoization of analysis results.
//!
//! Cache keys hash the OHLC input, the canonical config signature, and the
//! swing configuration, all under the current cache version. Payloads are
//! versioned JSON; entries from older schema versions are invalidated on
//! first access.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use dashmap::DashMap;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ZoneAnalysisConfig;
use crate::data;
use crate::errors::ZoneError;
use crate::models::ZoneAnalysisResult;
use crate::swing::swing_preset;

/// Monotonically incremented on any result-schema change.
pub const CACHE_VERSION: u32 = 2;

/// Default entry lifetime used by the builder.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Opaque key/value storage the cache layer sits on. Concurrent puts to the
/// same key are benign (last writer wins).
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: Value, ttl: Option<Duration>, disk: bool);
    fn invalidate(&self, key: &str);
}

struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

/// In-memory store with TTL eviction and an optional JSON spill directory
/// for entries written with `disk = true`.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    disk_dir: Option<PathBuf>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(dir: PathBuf) -> Self {
        Self {
            entries: DashMap::new(),
            disk_dir: Some(dir),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            match entry.expires_at {
                Some(deadline) if Instant::now() > deadline => {
                    drop(entry);
                    // TTL expiry removes the disk spill as well.
                    self.invalidate(key);
                    return None;
                }
                _ => return Some(entry.value.clone()),
            }
        }
        // Disk fallback for entries persisted by an earlier process.
        let path = self.disk_path(key)?;
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn put(&self, key: &str, value: Value, ttl: Option<Duration>, disk: bool) {
        if disk {
            if let Some(path) = self.disk_path(key) {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                match serde_json::to_string(&value) {
                    Ok(raw) => {
                        if let Err(err) = std::fs::write(&path, raw) {
                            warn!(%err, "failed to persist cache entry to disk");
                        }
                    }
                    Err(err) => warn!(%err, "failed to serialize cache entry for disk"),
                }
            }
        }
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        if let Some(path) = self.disk_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Process-wide default store used by the builder when caching is enabled
/// without an explicit store.
pub fn global_cache() -> Arc<MemoryCache> {
    static GLOBAL: OnceLock<Arc<MemoryCache>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(MemoryCache::new())).clone()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub created_at: NaiveDateTime,
    pub schema: String,
    pub tool_version: String,
}

/// Versioned payload written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePayload {
    pub cache_version: u32,
    pub result: ZoneAnalysisResult,
    pub metadata: CacheMetadata,
}

/// Version-aware wrapper over a [`CacheStore`] for zone analysis results.
pub struct ZoneAnalysisCache {
    store: Arc<dyn CacheStore>,
    version: u32,
}

impl ZoneAnalysisCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            version: CACHE_VERSION,
        }
    }

    /// Override the schema version; used to exercise upgrade invalidation.
    pub fn with_version(store: Arc<dyn CacheStore>, version: u32) -> Self {
        Self { store, version }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Deterministic, version-aware cache key.
    pub fn generate_cache_key(
        &self,
        data_hash: &str,
        config_signature: &str,
        swing_signature: &str,
    ) -> String {
        let config_hash = blake3::hash(config_signature.as_bytes()).to_hex();
        let swing_hash = blake3::hash(swing_signature.as_bytes()).to_hex();
        let parts = format!(
            "version={}|data={data_hash}|config={config_hash}|swing={swing_hash}",
            self.version
        );
        format!("zone_analysis_{}", blake3::hash(parts.as_bytes()).to_hex())
    }

    /// Load a result if present and version-compatible. Malformed or
    /// outdated entries are invalidated and treated as misses.
    pub fn load(&self, cache_key: &str) -> Option<ZoneAnalysisResult> {
        let value = self.store.get(cache_key)?;

        let Some(object) = value.as_object() else {
            info!("cache entry missing version metadata; invalidating and recalculating");
            self.store.invalidate(cache_key);
            return None;
        };
        let Some(cached_version) = object.get("cache_version").and_then(Value::as_u64) else {
            info!("cache entry missing version metadata; invalidating and recalculating");
            self.store.invalidate(cache_key);
            return None;
        };
        if (cached_version as u32) < self.version {
            info!(
                from = cached_version,
                to = self.version,
                "cache invalidated due to schema upgrade; recalculating"
            );
            self.store.invalidate(cache_key);
            return None;
        }

        match serde_json::from_value::<CachePayload>(value) {
            Ok(payload) => Some(payload.result),
            Err(err) => {
                warn!(%err, "cache entry failed to deserialize; invalidating");
                self.store.invalidate(cache_key);
                None
            }
        }
    }

    /// Persist a result wrapped in the versioned payload.
    pub fn save(
        &self,
        cache_key: &str,
        result: &ZoneAnalysisResult,
        ttl: Option<Duration>,
        disk: bool,
    ) -> Result<(), ZoneError> {
        let payload = CachePayload {
            cache_version: self.version,
            result: result.clone(),
            metadata: CacheMetadata {
                created_at: Utc::now().naive_utc(),
                schema: format!("ZoneAnalysisResult_v{}", self.version),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let value = serde_json::to_value(&payload)
            .map_err(|e| ZoneError::Cache(format!("failed to serialize cache payload: {e}")))?;
        self.store.put(cache_key, value, ttl, disk);
        debug!(key = &cache_key[..16.min(cache_key.len())], "saved zone analysis cache entry");
        Ok(())
    }

    pub fn invalidate(&self, cache_key: &str) {
        self.store.invalidate(cache_key);
    }

    /// Deterministic hash of the OHLC portion of the input. Volume is
    /// excluded on purpose: volume-only changes share the price cache line.
    pub fn compute_data_hash(df: &DataFrame) -> Result<String, ZoneError> {
        let mut hasher = blake3::Hasher::new();
        for column in ["open", "high", "low", "close"] {
            hasher.update(column.as_bytes());
            for v in data::column_to_f64(df, column)? {
                hasher.update(&v.to_bits().to_le_bytes());
            }
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Canonical JSON signature of the pipeline configuration. Fails with an
    /// actionable error when the config holds non-serializable predicates.
    pub fn config_signature(config: &ZoneAnalysisConfig) -> Result<String, ZoneError> {
        serde_json::to_string(config).map_err(|e| {
            ZoneError::Configuration(format!(
                "cannot cache a config with custom predicate closures; disable caching for \
                 this pipeline with .with_cache(false). Serialization error: {e}"
            ))
        })
    }

    /// Canonical JSON signature of the swing configuration: strategy name,
    /// resolved numeric preset parameters, scope, and adaptive flags.
    pub fn swing_signature(config: &ZoneAnalysisConfig) -> Result<String, ZoneError> {
        let preset = swing_preset(&config.swing.preset)?;
        let payload = serde_json::json!({
            "strategy": config.strategies.swing,
            "preset": config.swing.preset,
            "params": preset,
            "scope": config.swing.scope,
            "auto_thresholds": config.swing.auto_thresholds,
            "base_deviation": config.swing.base_deviation,
        });
        serde_json::to_string(&payload)
            .map_err(|e| ZoneError::Cache(format!("failed to serialize swing signature: {e}")))
    }
}

//! Preloaded zones: import externally produced zone ranges (expert markup,
//! trading-system exports, ML model output) and merge them onto the bar table.

use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::*;
use tracing::{info, warn};

use super::{Detection, DetectionStrategy, ExternalZone, RuleValue, ZoneDetectionConfig, ZonesSource};
use crate::data;
use crate::errors::ZoneError;
use crate::models::{IndicatorContext, ZoneInfo};

const SUPPORTED_EXTENSIONS: &[&str] = &["csv"];
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d",
];

/// Rules:
/// - `zones_data` (required): [`ZonesSource::Path`] to a CSV file or
///   [`ZonesSource::Rows`] held in memory. CSV needs a header with
///   `zone_id, type, start_time, end_time`.
/// - `time_tolerance` (optional): humantime duration string, default "1min".
///
/// Bars whose timestamps fall in `[start - tol, end + tol]` define each zone.
/// External rows with no matching bars are dropped with a warning. Returned
/// zones are re-ordered by `start_idx`; rows overlapping an earlier match are
/// dropped so the detection invariants hold.
#[derive(Debug)]
pub struct PreloadedZonesDetection;

impl DetectionStrategy for PreloadedZonesDetection {
    fn name(&self) -> &'static str {
        "preloaded"
    }

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError> {
        config.validate_required(&["zones_data"])?;

        let source = match config.rules.get("zones_data") {
            Some(RuleValue::Zones(source)) => source,
            Some(other) => {
                return Err(ZoneError::Configuration(format!(
                    "rule 'zones_data' must be a zones source, got {other:?}"
                )))
            }
            None => unreachable!("validated above"),
        };

        let tolerance_str = config.rule_str("time_tolerance")?.unwrap_or("1min");
        let tolerance = parse_tolerance(tolerance_str)?;

        let external = match source {
            ZonesSource::Rows(rows) => rows.clone(),
            ZonesSource::Path(path) => load_zones_csv(path)?,
        };

        let times = data::timestamps(df)?;
        let mut warnings = Vec::new();
        let mut matched: Vec<ZoneInfo> = Vec::new();

        for row in &external {
            let window_start = row.start_time - tolerance;
            let window_end = row.end_time + tolerance;
            let start_idx = times.partition_point(|&t| t < window_start);
            let end_excl = times.partition_point(|&t| t <= window_end);
            if start_idx >= end_excl {
                let msg = format!(
                    "no bars found for preloaded zone {} ({} - {})",
                    row.zone_id, row.start_time, row.end_time
                );
                warn!("{msg}");
                warnings.push(msg);
                continue;
            }
            let end_idx = end_excl - 1;
            let duration = end_idx - start_idx + 1;
            if duration < config.min_duration {
                continue;
            }
            if !config.accepts_type(&row.zone_type) {
                continue;
            }
            matched.push(ZoneInfo {
                zone_id: 0, // reassigned after ordering
                zone_type: row.zone_type.clone(),
                start_idx,
                end_idx,
                start_time: times[start_idx],
                end_time: times[end_idx],
                duration,
                data: df.slice(start_idx as i64, duration),
                features: None,
                indicator_context: IndicatorContext {
                    detection_indicator: None,
                    source: Some("external".to_string()),
                    detection_rules: [
                        ("preloaded".to_string(), RuleValue::Bool(true)),
                        (
                            "time_tolerance".to_string(),
                            RuleValue::Str(tolerance_str.to_string()),
                        ),
                    ]
                    .into_iter()
                    .collect(),
                    ..IndicatorContext::new("preloaded")
                },
                swing_context: None,
            });
        }

        matched.sort_by_key(|z| z.start_idx);
        let mut zones: Vec<ZoneInfo> = Vec::with_capacity(matched.len());
        for mut zone in matched {
            if let Some(last) = zones.last() {
                if zone.start_idx <= last.end_idx {
                    let msg = format!(
                        "preloaded zone over bars [{}, {}] overlaps an earlier zone; dropped",
                        zone.start_idx, zone.end_idx
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                    continue;
                }
            }
            zone.zone_id = zones.len();
            zones.push(zone);
        }

        info!(total = zones.len(), "loaded preloaded zones");

        Ok(Detection { zones, warnings })
    }
}

fn parse_tolerance(raw: &str) -> Result<chrono::Duration, ZoneError> {
    let std_duration = humantime::parse_duration(raw).map_err(|e| {
        ZoneError::Configuration(format!("invalid time_tolerance '{raw}': {e}"))
    })?;
    chrono::Duration::from_std(std_duration)
        .map_err(|_| ZoneError::Configuration(format!("time_tolerance '{raw}' out of range")))
}

fn parse_external_timestamp(raw: &str) -> Result<NaiveDateTime, ZoneError> {
    let trimmed = raw.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(ts);
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
        }
    }
    Err(ZoneError::Data(format!(
        "cannot parse timestamp '{trimmed}' in zones data"
    )))
}

fn load_zones_csv(path: &Path) -> Result<Vec<ExternalZone>, ZoneError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ZoneError::Configuration(format!(
            "unsupported zones file format '.{extension}'. Supported: {}",
            SUPPORTED_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    if !path.exists() {
        return Err(ZoneError::Data(format!(
            "zones file not found: {}",
            path.display()
        )));
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| ZoneError::Data(format!("non-UTF8 zones path: {}", path.display())))?;
    let df = LazyCsvReader::new(PlRefPath::new(path_str))
        .with_has_header(true)
        .finish()
        .map_err(|e| ZoneError::Data(format!("failed to open {}: {e}", path.display())))?
        .collect()
        .map_err(|e| ZoneError::Data(format!("failed to parse {}: {e}", path.display())))?;

    let available = data::column_names(&df);
    let missing: Vec<&str> = ["zone_id", "type", "start_time", "end_time"]
        .into_iter()
        .filter(|c| !available.iter().any(|a| a == c))
        .collect();
    if !missing.is_empty() {
        return Err(ZoneError::Data(format!(
            "missing required columns in zones data: {}",
            missing.join(", ")
        )));
    }

    let ids = df.column("zone_id")?.cast(&DataType::Int64)?;
    let ids = ids.i64()?;
    let types = df.column("type")?.cast(&DataType::String)?;
    let types = types.str()?;
    let starts = df.column("start_time")?.cast(&DataType::String)?;
    let starts = starts.str()?;
    let ends = df.column("end_time")?.cast(&DataType::String)?;
    let ends = ends.str()?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let zone_id = ids
            .get(i)
            .ok_or_else(|| ZoneError::Data(format!("null zone_id in row {i}")))?;
        let zone_type = types
            .get(i)
            .ok_or_else(|| ZoneError::Data(format!("null type in row {i}")))?
            .to_string();
        let start_raw = starts
            .get(i)
            .ok_or_else(|| ZoneError::Data(format!("null start_time in row {i}")))?;
        let end_raw = ends
            .get(i)
            .ok_or_else(|| ZoneError::Data(format!("null end_time in row {i}")))?;
        rows.push(ExternalZone {
            zone_id,
            zone_type,
            start_time: parse_external_timestamp(start_raw)?,
            end_time: parse_external_timestamp(end_raw)?,
        });
    }
    Ok(rows)
}

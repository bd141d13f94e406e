//! Zone detection: configuration, rule values, and the five detection
//! strategies behind one contract.
//!
//! All strategies classify each bar, run-length encode the class sequence,
//! drop runs shorter than `min_duration` or outside `zone_types`, and assign
//! `zone_id` sequentially in chronological order.

pub mod combined;
pub mod line_crossing;
pub mod preloaded;
pub mod registry;
pub mod threshold;
pub mod zero_crossing;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};

use crate::data;
use crate::errors::ZoneError;
use crate::models::{IndicatorContext, ZoneInfo};

/// Comparison operator used by declarative predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
        }
    }
}

/// Declarative, serializable predicate forms for the combined strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateSpec {
    /// `column <op> value`
    Compare {
        column: String,
        op: CmpOp,
        value: f64,
    },
    /// `lower <= column <= upper`
    Between {
        column: String,
        lower: f64,
        upper: f64,
    },
    /// `left <op> right` between two columns
    ColumnPair {
        left: String,
        op: CmpOp,
        right: String,
    },
}

type PredicateFn = dyn Fn(&DataFrame) -> Result<Vec<bool>, ZoneError> + Send + Sync;

/// A per-bar boolean condition over the table.
///
/// Declarative specs serialize (and therefore cache); `Custom` closures are
/// the one intentional boundary where user code cannot be serialized:
/// attempting to cache such a config fails with an actionable error.
#[derive(Clone)]
pub enum Predicate {
    Spec(PredicateSpec),
    Custom { name: String, func: Arc<PredicateFn> },
}

impl Predicate {
    pub fn compare(column: &str, op: CmpOp, value: f64) -> Self {
        Predicate::Spec(PredicateSpec::Compare {
            column: column.to_string(),
            op,
            value,
        })
    }

    pub fn between(column: &str, lower: f64, upper: f64) -> Self {
        Predicate::Spec(PredicateSpec::Between {
            column: column.to_string(),
            lower,
            upper,
        })
    }

    pub fn column_pair(left: &str, op: CmpOp, right: &str) -> Self {
        Predicate::Spec(PredicateSpec::ColumnPair {
            left: left.to_string(),
            op,
            right: right.to_string(),
        })
    }

    pub fn custom<F>(name: &str, func: F) -> Self
    where
        F: Fn(&DataFrame) -> Result<Vec<bool>, ZoneError> + Send + Sync + 'static,
    {
        Predicate::Custom {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    /// Evaluate against the table, returning one boolean per row.
    /// NaN comparisons are false.
    pub fn evaluate(&self, df: &DataFrame) -> Result<Vec<bool>, ZoneError> {
        let result = match self {
            Predicate::Spec(PredicateSpec::Compare { column, op, value }) => {
                let vals = data::column_to_f64(df, column)?;
                vals.iter().map(|&v| op.apply(v, *value)).collect()
            }
            Predicate::Spec(PredicateSpec::Between {
                column,
                lower,
                upper,
            }) => {
                let vals = data::column_to_f64(df, column)?;
                vals.iter().map(|&v| v >= *lower && v <= *upper).collect()
            }
            Predicate::Spec(PredicateSpec::ColumnPair { left, op, right }) => {
                let lhs = data::column_to_f64(df, left)?;
                let rhs = data::column_to_f64(df, right)?;
                lhs.iter()
                    .zip(rhs.iter())
                    .map(|(&a, &b)| op.apply(a, b))
                    .collect()
            }
            Predicate::Custom { func, .. } => {
                let out = func(df)?;
                if out.len() != df.height() {
                    return Err(ZoneError::Data(format!(
                        "custom predicate returned {} values for {} rows",
                        out.len(),
                        df.height()
                    )));
                }
                out
            }
        };
        Ok(result)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Spec(spec) => write!(f, "Predicate::Spec({spec:?})"),
            Predicate::Custom { name, .. } => write!(f, "Predicate::Custom({name})"),
        }
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Predicate::Spec(a), Predicate::Spec(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Predicate::Spec(spec) => spec.serialize(serializer),
            Predicate::Custom { name, .. } => Err(S::Error::custom(format!(
                "predicate '{name}' wraps a closure and cannot be serialized; \
                 disable caching for this pipeline"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PredicateSpec::deserialize(deserializer).map(Predicate::Spec)
    }
}

/// Zone type labels the combined strategy assigns to true/false runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTypeMap {
    pub active: String,
    pub inactive: String,
}

impl Default for ZoneTypeMap {
    fn default() -> Self {
        Self {
            active: "active".to_string(),
            inactive: "inactive".to_string(),
        }
    }
}

/// External zone row consumed by the preloaded strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalZone {
    pub zone_id: i64,
    #[serde(rename = "type")]
    pub zone_type: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Where the preloaded strategy reads its zones from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonesSource {
    Path(PathBuf),
    Rows(Vec<ExternalZone>),
}

/// One rule value in a detection config. The variants cover everything the
/// built-in strategies consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Predicates(Vec<Predicate>),
    Zones(ZonesSource),
    TypeMap(ZoneTypeMap),
}

impl From<bool> for RuleValue {
    fn from(v: bool) -> Self {
        RuleValue::Bool(v)
    }
}
impl From<i64> for RuleValue {
    fn from(v: i64) -> Self {
        RuleValue::Int(v)
    }
}
impl From<usize> for RuleValue {
    fn from(v: usize) -> Self {
        RuleValue::Int(v as i64)
    }
}
impl From<f64> for RuleValue {
    fn from(v: f64) -> Self {
        RuleValue::Float(v)
    }
}
impl From<&str> for RuleValue {
    fn from(v: &str) -> Self {
        RuleValue::Str(v.to_string())
    }
}
impl From<String> for RuleValue {
    fn from(v: String) -> Self {
        RuleValue::Str(v)
    }
}
impl From<Vec<Predicate>> for RuleValue {
    fn from(v: Vec<Predicate>) -> Self {
        RuleValue::Predicates(v)
    }
}
impl From<ZonesSource> for RuleValue {
    fn from(v: ZonesSource) -> Self {
        RuleValue::Zones(v)
    }
}

/// Universal detection configuration shared by all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDetectionConfig {
    /// Name resolved through the detection registry.
    pub strategy: String,
    /// Minimum zone length in bars.
    pub min_duration: usize,
    /// Zone tags to keep. The wildcard `"any"` accepts every tag.
    pub zone_types: Vec<String>,
    /// Strategy-specific rules; required keys depend on the strategy.
    pub rules: BTreeMap<String, RuleValue>,
    /// Opaque caller metadata, echoed through for logging.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for ZoneDetectionConfig {
    fn default() -> Self {
        Self {
            strategy: String::new(),
            min_duration: 2,
            zone_types: vec!["bull".to_string(), "bear".to_string()],
            rules: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl ZoneDetectionConfig {
    pub fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, key: &str, value: impl Into<RuleValue>) -> Self {
        self.rules.insert(key.to_string(), value.into());
        self
    }

    pub fn with_min_duration(mut self, min_duration: usize) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn with_zone_types<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        types: I,
    ) -> Self {
        self.zone_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Fail unless every required rule key is present.
    pub fn validate_required(&self, required: &[&str]) -> Result<(), ZoneError> {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|k| !self.rules.contains_key(*k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ZoneError::missing_rules(&self.strategy, &missing))
        }
    }

    pub fn rule_str(&self, key: &str) -> Result<Option<&str>, ZoneError> {
        match self.rules.get(key) {
            None => Ok(None),
            Some(RuleValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ZoneError::Configuration(format!(
                "rule '{key}' must be a string, got {other:?}"
            ))),
        }
    }

    pub fn rule_f64(&self, key: &str) -> Result<Option<f64>, ZoneError> {
        match self.rules.get(key) {
            None => Ok(None),
            Some(RuleValue::Float(v)) => Ok(Some(*v)),
            Some(RuleValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(ZoneError::Configuration(format!(
                "rule '{key}' must be numeric, got {other:?}"
            ))),
        }
    }

    pub fn rule_usize(&self, key: &str) -> Result<Option<usize>, ZoneError> {
        match self.rules.get(key) {
            None => Ok(None),
            Some(RuleValue::Int(v)) if *v >= 0 => Ok(Some(*v as usize)),
            Some(other) => Err(ZoneError::Configuration(format!(
                "rule '{key}' must be a non-negative integer, got {other:?}"
            ))),
        }
    }

    /// Whether `zone_type` passes the `zone_types` filter.
    pub fn accepts_type(&self, zone_type: &str) -> bool {
        self.zone_types.iter().any(|t| t == zone_type || t == "any")
    }
}

/// Output of one detection run: chronologically ordered zones plus any
/// warnings that should surface in the result metadata.
#[derive(Debug, Default)]
pub struct Detection {
    pub zones: Vec<ZoneInfo>,
    pub warnings: Vec<String>,
}

/// Contract implemented by every detection strategy.
pub trait DetectionStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn detect_zones(
        &self,
        df: &DataFrame,
        config: &ZoneDetectionConfig,
    ) -> Result<Detection, ZoneError>;
}

/// Run-length encode a per-bar class sequence into zones. `None` classes
/// (NaN indicator values) break runs and are never part of a zone.
pub(crate) fn zones_from_classes<F>(
    df: &DataFrame,
    times: &[NaiveDateTime],
    classes: &[Option<String>],
    config: &ZoneDetectionConfig,
    mut make_context: F,
) -> Result<Vec<ZoneInfo>, ZoneError>
where
    F: FnMut(&str) -> IndicatorContext,
{
    if classes.len() != df.height() || times.len() != df.height() {
        return Err(ZoneError::Internal(format!(
            "class vector length {} does not match table height {}",
            classes.len(),
            df.height()
        )));
    }

    let n = classes.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut zones = Vec::new();
    let mut run_start = 0usize;

    for i in 0..=n {
        let boundary = i == n || classes[i] != classes[run_start];
        if !boundary {
            continue;
        }
        let run_end = i - 1;
        if let Some(class) = &classes[run_start] {
            let duration = run_end - run_start + 1;
            if duration >= config.min_duration && config.accepts_type(class) {
                zones.push(ZoneInfo {
                    zone_id: zones.len(),
                    zone_type: class.clone(),
                    start_idx: run_start,
                    end_idx: run_end,
                    start_time: times[run_start],
                    end_time: times[run_end],
                    duration,
                    data: df.slice(run_start as i64, duration),
                    features: None,
                    indicator_context: make_context(class),
                    swing_context: None,
                });
            }
        }
        if i < n {
            run_start = i;
        }
    }

    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_required_reports_missing_keys() {
        let config = ZoneDetectionConfig::new("threshold").with_rule("indicator_col", "rsi");
        let err = config
            .validate_required(&["indicator_col", "upper_threshold", "lower_threshold"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("upper_threshold"));
        assert!(msg.contains("lower_threshold"));
        assert!(!msg.contains("indicator_col,"));
    }

    #[test]
    fn rule_f64_coerces_int() {
        let config = ZoneDetectionConfig::new("threshold").with_rule("upper_threshold", 70i64);
        assert_eq!(config.rule_f64("upper_threshold").unwrap(), Some(70.0));
    }

    #[test]
    fn accepts_type_wildcard() {
        let config = ZoneDetectionConfig::new("preloaded").with_zone_types(["any"]);
        assert!(config.accepts_type("supply"));
        assert!(config.accepts_type("bull"));
    }

    #[test]
    fn declarative_predicate_serializes() {
        let pred = Predicate::compare("rsi", CmpOp::Gt, 70.0);
        let json = serde_json::to_string(&pred).unwrap();
        assert!(json.contains("compare"));
        let back: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pred);
    }

    #[test]
    fn custom_predicate_refuses_serialization() {
        let pred = Predicate::custom("always", |df| Ok(vec![true; df.height()]));
        let err = serde_json::to_string(&pred).unwrap_err();
        assert!(err.to_string().contains("cannot be serialized"));
    }

    #[test]
    fn predicate_evaluates_column_pair() {
        let df = polars::prelude::df! {
            "a" => &[1.0, 3.0, 2.0],
            "b" => &[2.0, 2.0, 2.0],
        }
        .unwrap();
        let pred = Predicate::column_pair("a", CmpOp::Gt, "b");
        assert_eq!(pred.evaluate(&df).unwrap(), vec![false, true, false]);
    }
}

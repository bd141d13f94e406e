//! Zone sequence analysis: transitions over the chronological type sequence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::ZoneFeatures;

/// Minimum zones before transition analysis is meaningful.
pub const MIN_ZONES_FOR_SEQUENCE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceAnalysis {
    pub total_transitions: usize,
    /// Counts keyed `"from->to"`.
    pub transition_counts: BTreeMap<String, usize>,
    /// Per-source-type transition probabilities, keyed `"from->to"`.
    pub transition_probabilities: BTreeMap<String, f64>,
    pub unique_types: Vec<String>,
}

/// Transition counts and conditional probabilities over the ordered zone
/// type sequence. Caller is responsible for the minimum-zones gate.
pub fn analyze_transitions(features: &[ZoneFeatures]) -> SequenceAnalysis {
    let sequence: Vec<&str> = features.iter().map(|f| f.zone_type.as_str()).collect();

    let mut transition_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut from_totals: BTreeMap<&str, usize> = BTreeMap::new();
    for pair in sequence.windows(2) {
        let key = format!("{}->{}", pair[0], pair[1]);
        *transition_counts.entry(key).or_insert(0) += 1;
        *from_totals.entry(pair[0]).or_insert(0) += 1;
    }

    let transition_probabilities: BTreeMap<String, f64> = transition_counts
        .iter()
        .map(|(key, &count)| {
            let from = key.split("->").next().expect("key has separator");
            let total = from_totals.get(from).copied().unwrap_or(1);
            (key.clone(), count as f64 / total as f64)
        })
        .collect();

    let mut unique_types: Vec<String> = sequence.iter().map(|s| (*s).to_string()).collect();
    unique_types.sort();
    unique_types.dedup();

    SequenceAnalysis {
        total_transitions: sequence.len().saturating_sub(1),
        transition_counts,
        transition_probabilities,
        unique_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureMetadata;

    fn feature(zone_type: &str) -> ZoneFeatures {
        ZoneFeatures {
            zone_id: 0,
            zone_type: zone_type.to_string(),
            duration: 5,
            start_price: 100.0,
            end_price: 101.0,
            price_return: 0.01,
            price_range_pct: 0.02,
            hist_amplitude: None,
            hist_slope: None,
            atr_normalized_return: None,
            correlation_price_hist: None,
            num_peaks: None,
            num_troughs: None,
            drawdown_from_peak: None,
            rally_from_trough: None,
            peak_time_ratio: None,
            trough_time_ratio: None,
            metadata: FeatureMetadata::default(),
        }
    }

    #[test]
    fn alternating_sequence_counts() {
        let features: Vec<ZoneFeatures> =
            ["bull", "bear", "bull", "bear", "bull"].iter().map(|t| feature(t)).collect();
        let analysis = analyze_transitions(&features);
        assert_eq!(analysis.total_transitions, 4);
        assert_eq!(analysis.transition_counts["bull->bear"], 2);
        assert_eq!(analysis.transition_counts["bear->bull"], 2);
        assert!((analysis.transition_probabilities["bull->bear"] - 1.0).abs() < 1e-12);
        assert_eq!(analysis.unique_types, vec!["bear", "bull"]);
    }

    #[test]
    fn repeated_type_probabilities_split() {
        let features: Vec<ZoneFeatures> =
            ["bull", "bull", "bear", "bull"].iter().map(|t| feature(t)).collect();
        let analysis = analyze_transitions(&features);
        // From bull: bull->bull once, bull->bear once.
        assert!((analysis.transition_probabilities["bull->bull"] - 0.5).abs() < 1e-12);
        assert!((analysis.transition_probabilities["bull->bear"] - 0.5).abs() < 1e-12);
        assert!((analysis.transition_probabilities["bear->bull"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_zone_has_no_transitions() {
        let analysis = analyze_transitions(&[feature("bull")]);
        assert_eq!(analysis.total_transitions, 0);
        assert!(analysis.transition_counts.is_empty());
    }
}

//! Hypothesis tests over the zone population.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::stats::{pearson, welch_t_test};
use crate::models::ZoneFeatures;

pub const DEFAULT_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTest {
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub description: String,
    pub sample_sizes: (usize, usize),
}

/// All tests that could run on the population, keyed by test name.
/// Tests whose preconditions fail (one-sided populations, too few samples)
/// are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesisTestReport {
    pub alpha: f64,
    pub tests: BTreeMap<String, HypothesisTest>,
}

/// Welch-based test suite comparing the two dominant zone types plus a
/// duration/return dependence test.
pub struct HypothesisTestSuite {
    alpha: f64,
}

impl Default for HypothesisTestSuite {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl HypothesisTestSuite {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn run_all_tests(&self, features: &[ZoneFeatures]) -> HypothesisTestReport {
        let mut report = HypothesisTestReport {
            alpha: self.alpha,
            tests: BTreeMap::new(),
        };
        if features.is_empty() {
            return report;
        }

        let (group_a, group_b) = match dominant_types(features) {
            Some(groups) => groups,
            None => (String::new(), String::new()),
        };

        if !group_a.is_empty() {
            self.two_sample(
                &mut report,
                features,
                &group_a,
                &group_b,
                "duration_by_type",
                |f| Some(f.duration as f64),
            );
            self.two_sample(
                &mut report,
                features,
                &group_a,
                &group_b,
                "return_by_type",
                |f| Some(f.price_return),
            );
            self.two_sample(
                &mut report,
                features,
                &group_a,
                &group_b,
                "amplitude_by_type",
                |f| f.hist_amplitude,
            );
        }

        // Does zone duration predict the realized return?
        let durations: Vec<f64> = features.iter().map(|f| f.duration as f64).collect();
        let returns: Vec<f64> = features.iter().map(|f| f.price_return).collect();
        if let Some(r) = pearson(&durations, &returns) {
            let n = durations.len() as f64;
            if n > 2.0 {
                // A perfectly collinear sample degenerates to p = 0.
                let p = if 1.0 - r * r <= f64::EPSILON {
                    0.0
                } else {
                    let t = r * ((n - 2.0) / (1.0 - r * r)).sqrt();
                    StudentsT::new(0.0, 1.0, n - 2.0)
                        .map(|dist| 2.0 * (1.0 - dist.cdf(t.abs())))
                        .unwrap_or(1.0)
                };
                report.tests.insert(
                    "duration_return_correlation".to_string(),
                    HypothesisTest {
                        statistic: r,
                        p_value: p,
                        significant: p < self.alpha,
                        description: "Pearson correlation between zone duration and price return"
                            .to_string(),
                        sample_sizes: (durations.len(), durations.len()),
                    },
                );
            }
        }

        report
    }

    fn two_sample<F>(
        &self,
        report: &mut HypothesisTestReport,
        features: &[ZoneFeatures],
        group_a: &str,
        group_b: &str,
        name: &str,
        extract: F,
    ) where
        F: Fn(&ZoneFeatures) -> Option<f64>,
    {
        let a: Vec<f64> = features
            .iter()
            .filter(|f| f.zone_type == group_a)
            .filter_map(&extract)
            .filter(|v| v.is_finite())
            .collect();
        let b: Vec<f64> = features
            .iter()
            .filter(|f| f.zone_type == group_b)
            .filter_map(&extract)
            .filter(|v| v.is_finite())
            .collect();
        if let Some((t, p)) = welch_t_test(&a, &b) {
            report.tests.insert(
                name.to_string(),
                HypothesisTest {
                    statistic: t,
                    p_value: p,
                    significant: p < self.alpha,
                    description: format!("Welch t-test of {name} between '{group_a}' and '{group_b}'"),
                    sample_sizes: (a.len(), b.len()),
                },
            );
        }
    }
}

/// The two most common zone types, by count then name.
fn dominant_types(features: &[ZoneFeatures]) -> Option<(String, String)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for f in features {
        *counts.entry(f.zone_type.as_str()).or_insert(0) += 1;
    }
    if counts.len() < 2 {
        return None;
    }
    let mut ordered: Vec<(&str, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    Some((ordered[0].0.to_string(), ordered[1].0.to_string()))
}

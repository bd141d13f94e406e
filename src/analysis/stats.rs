//! Population statistics over extracted zone features.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::models::ZoneFeatures;

/// Distribution summary reported for every metric:
/// count, mean, median, std, min, max, q25, q75, skewness, kurtosis.
/// Quantiles use linear interpolation; kurtosis is excess kurtosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl DistributionStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.is_empty() {
            return None;
        }
        clean.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
        let (mean, std, skewness, kurtosis) = sample_moments(&clean)?;
        Some(Self {
            count: clean.len(),
            mean,
            median: percentile(&clean, 0.5),
            std,
            min: clean[0],
            max: clean[clean.len() - 1],
            q25: percentile(&clean, 0.25),
            q75: percentile(&clean, 0.75),
            skewness,
            kurtosis,
        })
    }
}

/// Per-type summary for one metric (count plus the five-number core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl TypeStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        let mut clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.is_empty() {
            return None;
        }
        clean.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
        let mean = clean.iter().sum::<f64>() / clean.len() as f64;
        Some(Self {
            count: clean.len(),
            mean,
            median: percentile(&clean, 0.5),
            std: sample_std(&clean, mean),
            min: clean[0],
            max: clean[clean.len() - 1],
        })
    }
}

/// Welch two-sample comparison between the two dominant zone types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoSampleComparison {
    pub group_a: String,
    pub group_b: String,
    pub t_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    /// `mean(a) / mean(b)` when the denominator is non-zero.
    pub mean_ratio: Option<f64>,
}

/// One metric's full distribution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDistribution {
    pub overall: DistributionStats,
    pub per_type: BTreeMap<String, TypeStats>,
    pub comparison: Option<TwoSampleComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub mean: f64,
    pub std: f64,
    pub positive_correlations: usize,
    pub negative_correlations: usize,
    /// `|r| > 0.7`
    pub strong_correlations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaksTroughsSummary {
    pub avg_peaks_per_zone: f64,
    pub avg_troughs_per_zone: f64,
    pub zones_with_peaks: usize,
    pub zones_with_troughs: usize,
}

/// Aggregate statistics over the full zone population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatistics {
    pub total_zones: usize,
    pub zones_per_type: BTreeMap<String, usize>,
    pub type_ratios: BTreeMap<String, f64>,
    pub duration: Option<MetricDistribution>,
    pub price_return: Option<MetricDistribution>,
    pub hist_amplitude: Option<MetricDistribution>,
    pub correlation: Option<CorrelationSummary>,
    pub peaks_troughs: Option<PeaksTroughsSummary>,
}

/// Compute population statistics over the extracted feature records.
pub fn compute_statistics(features: &[ZoneFeatures]) -> ZoneStatistics {
    if features.is_empty() {
        return ZoneStatistics::default();
    }

    let mut zones_per_type: BTreeMap<String, usize> = BTreeMap::new();
    for f in features {
        *zones_per_type.entry(f.zone_type.clone()).or_insert(0) += 1;
    }
    let total = features.len();
    let type_ratios: BTreeMap<String, f64> = zones_per_type
        .iter()
        .map(|(k, &v)| (k.clone(), v as f64 / total as f64))
        .collect();

    let duration = metric_distribution(features, |f| Some(f.duration as f64));
    let price_return = metric_distribution(features, |f| Some(f.price_return));
    let hist_amplitude = metric_distribution(features, |f| f.hist_amplitude);

    let correlations: Vec<f64> = features
        .iter()
        .filter_map(|f| f.correlation_price_hist)
        .filter(|v| v.is_finite())
        .collect();
    let correlation = if correlations.is_empty() {
        None
    } else {
        let mean = correlations.iter().sum::<f64>() / correlations.len() as f64;
        Some(CorrelationSummary {
            mean,
            std: sample_std(&correlations, mean),
            positive_correlations: correlations.iter().filter(|&&v| v > 0.0).count(),
            negative_correlations: correlations.iter().filter(|&&v| v < 0.0).count(),
            strong_correlations: correlations.iter().filter(|&&v| v.abs() > 0.7).count(),
        })
    };

    let peaks: Vec<f64> = features
        .iter()
        .filter_map(|f| f.num_peaks.map(|v| v as f64))
        .collect();
    let troughs: Vec<f64> = features
        .iter()
        .filter_map(|f| f.num_troughs.map(|v| v as f64))
        .collect();
    let peaks_troughs = if peaks.is_empty() && troughs.is_empty() {
        None
    } else {
        Some(PeaksTroughsSummary {
            avg_peaks_per_zone: mean_or_zero(&peaks),
            avg_troughs_per_zone: mean_or_zero(&troughs),
            zones_with_peaks: peaks.iter().filter(|&&v| v > 0.0).count(),
            zones_with_troughs: troughs.iter().filter(|&&v| v > 0.0).count(),
        })
    };

    ZoneStatistics {
        total_zones: total,
        zones_per_type,
        type_ratios,
        duration,
        price_return,
        hist_amplitude,
        correlation,
        peaks_troughs,
    }
}

fn metric_distribution<F>(features: &[ZoneFeatures], extract: F) -> Option<MetricDistribution>
where
    F: Fn(&ZoneFeatures) -> Option<f64>,
{
    let all: Vec<f64> = features.iter().filter_map(&extract).collect();
    let overall = DistributionStats::from_values(&all)?;

    let mut per_type: BTreeMap<String, TypeStats> = BTreeMap::new();
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for f in features {
        if let Some(v) = extract(f) {
            grouped.entry(f.zone_type.clone()).or_default().push(v);
        }
    }
    for (zone_type, values) in &grouped {
        if let Some(stats) = TypeStats::from_values(values) {
            per_type.insert(zone_type.clone(), stats);
        }
    }

    // Compare the two dominant types when both have enough samples.
    let mut by_size: Vec<(&String, &Vec<f64>)> = grouped.iter().collect();
    by_size.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));
    let comparison = if by_size.len() >= 2 && by_size[0].1.len() > 1 && by_size[1].1.len() > 1 {
        welch_t_test(by_size[0].1, by_size[1].1).map(|(t, p)| {
            let mean_a = mean_or_zero(by_size[0].1);
            let mean_b = mean_or_zero(by_size[1].1);
            TwoSampleComparison {
                group_a: by_size[0].0.clone(),
                group_b: by_size[1].0.clone(),
                t_statistic: t,
                p_value: p,
                significant: p < 0.05,
                mean_ratio: if mean_b == 0.0 {
                    None
                } else {
                    Some(mean_a / mean_b)
                },
            }
        })
    } else {
        None
    };

    Some(MetricDistribution {
        overall,
        per_type,
        comparison,
    })
}

// ── shared numeric helpers ───────────────────────────────────────────────────

pub(crate) fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n-1 denominator), 0 for fewer than 2 values.
pub(crate) fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Mean, sample std, sample skewness, and excess kurtosis.
pub(crate) fn sample_moments(values: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = sample_std(values, mean);

    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return Some((mean, std, 0.0, 0.0));
    }
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n;
    let skewness = m3 / m2.powf(1.5);
    let kurtosis = m4 / (m2 * m2) - 3.0;
    Some((mean, std, skewness, kurtosis))
}

/// Linear-interpolation percentile over an ascending-sorted slice.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let weight = rank - lo as f64;
        sorted[lo] * (1.0 - weight) + sorted[hi] * weight
    }
}

/// Pearson correlation over paired samples, skipping non-finite pairs.
/// None with fewer than 3 valid pairs or zero variance.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Welch's unequal-variance t-test: (t statistic, two-sided p-value).
/// None when either sample has fewer than 2 values or both variances are 0.
pub(crate) fn welch_t_test(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let mean_a = mean_or_zero(a);
    let mean_b = mean_or_zero(b);
    let var_a = sample_std(a, mean_a).powi(2);
    let var_b = sample_std(b, mean_b).powi(2);
    let se2 = var_a / na + var_b / nb;
    if se2 == 0.0 {
        return None;
    }
    let t = (mean_a - mean_b) / se2.sqrt();
    // Welch–Satterthwaite degrees of freedom.
    let df = se2.powi(2)
        / ((var_a / na).powi(2) / (na - 1.0) + (var_b / nb).powi(2) / (nb - 1.0));
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    Some((t, p))
}

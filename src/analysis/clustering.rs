//! K-means clustering of zone feature vectors.
//!
//! Initialisation is seeded k-means++ so identical inputs always produce
//! identical results, which the pipeline's idempotence contract requires.

use nalgebra::DVector;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::ZoneError;
use crate::models::ZoneFeatures;

const KMEANS_SEED: u64 = 42;
const MAX_ITERATIONS: usize = 100;

pub const CLUSTER_FEATURE_NAMES: &[&str] =
    &["duration", "price_return", "hist_amplitude", "price_range_pct"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub n_clusters: usize,
    pub feature_names: Vec<String>,
    /// One label per zone, in chronological zone order.
    pub labels: Vec<usize>,
    /// Centroids in original (unstandardized) feature units.
    pub centroids: Vec<Vec<f64>>,
    pub cluster_sizes: Vec<usize>,
    /// Sum of squared distances in standardized space.
    pub inertia: f64,
}

/// Cluster the zone population into `n_clusters` groups over standardized
/// `[duration, price_return, hist_amplitude, price_range_pct]` vectors.
pub fn cluster_zones(
    features: &[ZoneFeatures],
    n_clusters: usize,
) -> Result<ClusteringResult, ZoneError> {
    if n_clusters == 0 {
        return Err(ZoneError::Configuration(
            "n_clusters must be at least 1".into(),
        ));
    }
    if features.len() < n_clusters {
        return Err(ZoneError::Data(format!(
            "clustering needs at least {n_clusters} zones, got {}",
            features.len()
        )));
    }

    let raw: Vec<Vec<f64>> = features.iter().map(feature_vector).collect();
    let dims = CLUSTER_FEATURE_NAMES.len();

    // Standardize per dimension (population std; constant dims stay 0).
    let mut means = vec![0.0; dims];
    let mut stds = vec![0.0; dims];
    for d in 0..dims {
        let column: Vec<f64> = raw.iter().map(|v| v[d]).collect();
        let mean = column.iter().sum::<f64>() / column.len() as f64;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / column.len() as f64;
        means[d] = mean;
        stds[d] = var.sqrt();
    }
    let points: Vec<DVector<f64>> = raw
        .iter()
        .map(|v| {
            DVector::from_iterator(
                dims,
                v.iter().enumerate().map(|(d, &x)| {
                    if stds[d] > 0.0 {
                        (x - means[d]) / stds[d]
                    } else {
                        0.0
                    }
                }),
            )
        })
        .collect();

    let mut centroids = init_centroids(&points, n_clusters);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| OrderedFloat((point - *c).norm_squared()))
                .map(|(idx, _)| idx)
                .expect("at least one centroid");
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![DVector::zeros(dims); n_clusters];
        let mut counts = vec![0usize; n_clusters];
        for (point, &label) in points.iter().zip(labels.iter()) {
            sums[label] += point;
            counts[label] += 1;
        }
        for k in 0..n_clusters {
            if counts[k] > 0 {
                centroids[k] = &sums[k] / counts[k] as f64;
            }
        }

        if !changed {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(labels.iter())
        .map(|(p, &l)| (p - &centroids[l]).norm_squared())
        .sum();

    let mut cluster_sizes = vec![0usize; n_clusters];
    for &label in &labels {
        cluster_sizes[label] += 1;
    }

    // Report centroids back in original units.
    let centroids_raw: Vec<Vec<f64>> = centroids
        .iter()
        .map(|c| {
            (0..dims)
                .map(|d| {
                    if stds[d] > 0.0 {
                        c[d] * stds[d] + means[d]
                    } else {
                        means[d]
                    }
                })
                .collect()
        })
        .collect();

    Ok(ClusteringResult {
        n_clusters,
        feature_names: CLUSTER_FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
        labels,
        centroids: centroids_raw,
        cluster_sizes,
        inertia,
    })
}

fn feature_vector(f: &ZoneFeatures) -> Vec<f64> {
    vec![
        f.duration as f64,
        f.price_return,
        f.hist_amplitude.unwrap_or(0.0),
        f.price_range_pct,
    ]
}

/// Seeded k-means++: the first centroid is sampled uniformly, each next one
/// proportionally to squared distance from the nearest chosen centroid.
fn init_centroids(points: &[DVector<f64>], k: usize) -> Vec<DVector<f64>> {
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);
    let mut centroids: Vec<DVector<f64>> = Vec::with_capacity(k);
    centroids.push(points[rng.random_range(0..points.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| (p - c).norm_squared())
                    .fold(f64::MAX, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();
        if total == 0.0 {
            // All points coincide with existing centroids.
            centroids.push(points[centroids.len() % points.len()].clone());
            continue;
        }
        let mut target = rng.random_range(0.0..total);
        let mut chosen = points.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            if target < *d {
                chosen = i;
                break;
            }
            target -= d;
        }
        centroids.push(points[chosen].clone());
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureMetadata;

    fn feature(duration: usize, price_return: f64, amplitude: f64) -> ZoneFeatures {
        ZoneFeatures {
            zone_id: 0,
            zone_type: "bull".to_string(),
            duration,
            start_price: 100.0,
            end_price: 100.0 * (1.0 + price_return),
            price_return,
            price_range_pct: amplitude / 10.0,
            hist_amplitude: Some(amplitude),
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

    fn two_blobs() -> Vec<ZoneFeatures> {
        let mut features = Vec::new();
        for i in 0..6 {
            features.push(feature(5 + i % 2, 0.01, 1.0));
        }
        for i in 0..6 {
            features.push(feature(50 + i % 2, 0.20, 9.0));
        }
        features
    }

    #[test]
    fn separates_two_obvious_blobs() {
        let result = cluster_zones(&two_blobs(), 2).unwrap();
        assert_eq!(result.labels.len(), 12);
        let first = result.labels[0];
        assert!(result.labels[..6].iter().all(|&l| l == first));
        let second = result.labels[6];
        assert_ne!(first, second);
        assert!(result.labels[6..].iter().all(|&l| l == second));
        assert_eq!(result.cluster_sizes.iter().sum::<usize>(), 12);
    }

    #[test]
    fn deterministic_across_runs() {
        let features = two_blobs();
        let a = cluster_zones(&features, 3).unwrap();
        let b = cluster_zones(&features, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_zones_is_an_error() {
        let features = vec![feature(5, 0.01, 1.0)];
        assert!(cluster_zones(&features, 3).is_err());
    }

    #[test]
    fn zero_clusters_rejected() {
        assert!(cluster_zones(&two_blobs(), 0).is_err());
    }

    #[test]
    fn centroids_are_in_original_units() {
        let result = cluster_zones(&two_blobs(), 2).unwrap();
        // Duration centroids should land near 5.5 and 50.5.
        let mut durations: Vec<f64> = result.centroids.iter().map(|c| c[0]).collect();
        durations.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((durations[0] - 5.5).abs() < 1.0);
        assert!((durations[1] - 50.5).abs() < 1.0);
    }
}

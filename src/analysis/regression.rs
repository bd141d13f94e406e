//! OLS regression over zone features: duration and return predictors.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::errors::ZoneError;
use crate::models::ZoneFeatures;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    pub target: String,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub r_squared: f64,
    pub n_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub duration: Option<RegressionResult>,
    pub price_return: Option<RegressionResult>,
}

/// Fit both predictors. Individual fits that degenerate (rank deficiency,
/// zero variance target) come back as `None`.
pub fn run_regressions(features: &[ZoneFeatures]) -> RegressionReport {
    RegressionReport {
        duration: predict_duration(features).ok(),
        price_return: predict_return(features).ok(),
    }
}

/// Duration from oscillator amplitude and price range.
fn predict_duration(features: &[ZoneFeatures]) -> Result<RegressionResult, ZoneError> {
    let names = vec!["hist_amplitude".to_string(), "price_range_pct".to_string()];
    let rows: Vec<(Vec<f64>, f64)> = features
        .iter()
        .filter_map(|f| {
            let amplitude = f.hist_amplitude?;
            Some((vec![amplitude, f.price_range_pct], f.duration as f64))
        })
        .collect();
    fit_ols("duration", names, &rows)
}

/// Price return from duration, amplitude, and price range.
fn predict_return(features: &[ZoneFeatures]) -> Result<RegressionResult, ZoneError> {
    let names = vec![
        "duration".to_string(),
        "hist_amplitude".to_string(),
        "price_range_pct".to_string(),
    ];
    let rows: Vec<(Vec<f64>, f64)> = features
        .iter()
        .filter_map(|f| {
            let amplitude = f.hist_amplitude?;
            Some((
                vec![f.duration as f64, amplitude, f.price_range_pct],
                f.price_return,
            ))
        })
        .collect();
    fit_ols("price_return", names, &rows)
}

/// Ordinary least squares with an intercept column, solved via SVD.
fn fit_ols(
    target: &str,
    feature_names: Vec<String>,
    rows: &[(Vec<f64>, f64)],
) -> Result<RegressionResult, ZoneError> {
    let p = feature_names.len();
    let usable: Vec<&(Vec<f64>, f64)> = rows
        .iter()
        .filter(|(x, y)| y.is_finite() && x.iter().all(|v| v.is_finite()))
        .collect();
    let n = usable.len();
    if n < p + 2 {
        return Err(ZoneError::Data(format!(
            "regression on '{target}' needs at least {} samples, got {n}",
            p + 2
        )));
    }

    let mut design = DMatrix::zeros(n, p + 1);
    let mut response = DVector::zeros(n);
    for (i, (x, y)) in usable.iter().enumerate() {
        design[(i, 0)] = 1.0;
        for (j, &v) in x.iter().enumerate() {
            design[(i, j + 1)] = v;
        }
        response[i] = *y;
    }

    let svd = design.clone().svd(true, true);
    let beta = svd
        .solve(&response, 1e-12)
        .map_err(|e| ZoneError::Data(format!("regression on '{target}' failed: {e}")))?;

    let fitted = &design * &beta;
    let residual_ss: f64 = (&response - &fitted).norm_squared();
    let mean_y = response.mean();
    let total_ss: f64 = response.iter().map(|y| (y - mean_y).powi(2)).sum();
    if total_ss == 0.0 {
        return Err(ZoneError::Data(format!(
            "regression on '{target}' has a constant target"
        )));
    }

    Ok(RegressionResult {
        target: target.to_string(),
        feature_names,
        coefficients: beta.iter().skip(1).copied().collect(),
        intercept: beta[0],
        r_squared: 1.0 - residual_ss / total_ss,
        n_samples: n,
    })
}

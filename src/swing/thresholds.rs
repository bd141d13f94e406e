//! Adaptive swing thresholds scaled from the price range of a window.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::data;
use crate::errors::ZoneError;

pub const DEFAULT_BASE_DEVIATION: f64 = 0.01;

/// Dynamically computed thresholds for the three swing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingThresholds {
    pub swing_deviation: f64,
    pub peak_prominence: f64,
    pub pivot_deviation: f64,
}

impl SwingThresholds {
    fn flat(base_deviation: f64) -> Self {
        Self {
            swing_deviation: base_deviation,
            peak_prominence: base_deviation,
            pivot_deviation: base_deviation,
        }
    }
}

/// A stable mid-price for a window: median of close, mean fallback.
fn safe_mid_price(close: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = close.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if valid.len() % 2 == 1 {
        valid[valid.len() / 2]
    } else {
        (valid[valid.len() / 2 - 1] + valid[valid.len() / 2]) / 2.0
    };
    if median != 0.0 {
        return Some(median);
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    if mean == 0.0 {
        None
    } else {
        Some(mean)
    }
}

/// Scale swing thresholds from the price range of a window:
/// `relative_range = (max(high) - min(low)) / mid_price`, then
/// deviation = `max(base, rr·0.5)`, prominence = `max(base, rr·0.3)`,
/// pivot deviation = `max(base, rr·0.25)`. Degenerate inputs (empty window,
/// zero mid-price) fall back to the base deviation.
pub fn auto_swing_thresholds(
    window: &DataFrame,
    base_deviation: f64,
) -> Result<SwingThresholds, ZoneError> {
    if window.height() == 0 {
        return Ok(SwingThresholds::flat(base_deviation));
    }

    let high = data::column_to_f64(window, "high")?;
    let low = data::column_to_f64(window, "low")?;
    let close = data::column_to_f64(window, "close")?;

    let max_high = high.iter().copied().filter(|v| !v.is_nan()).fold(f64::MIN, f64::max);
    let min_low = low.iter().copied().filter(|v| !v.is_nan()).fold(f64::MAX, f64::min);
    if max_high == f64::MIN || min_low == f64::MAX {
        return Ok(SwingThresholds::flat(base_deviation));
    }

    let relative_range = match safe_mid_price(&close) {
        Some(mid) => (max_high - min_low) / mid,
        None => base_deviation,
    };

    Ok(SwingThresholds {
        swing_deviation: base_deviation.max(relative_range * 0.5),
        peak_prominence: base_deviation.max(relative_range * 0.3),
        pivot_deviation: base_deviation.max(relative_range * 0.25),
    })
}

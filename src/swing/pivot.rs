//! Classical fractal pivot points over high/low prices.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use super::{clean_pivots, PivotPointsParams, SwingStrategy};
use crate::data;
use crate::errors::ZoneError;
use crate::models::{SwingKind, SwingPoint};

pub struct PivotPointsSwing {
    params: PivotPointsParams,
}

impl PivotPointsSwing {
    pub fn new(params: PivotPointsParams) -> Self {
        Self { params }
    }
}

impl SwingStrategy for PivotPointsSwing {
    fn name(&self) -> &'static str {
        "pivot_points"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        [
            ("left".to_string(), self.params.left as f64),
            ("right".to_string(), self.params.right as f64),
            (
                "min_amplitude_pct".to_string(),
                self.params.min_amplitude_pct,
            ),
        ]
        .into_iter()
        .collect()
    }

    fn find_pivots(&self, df: &DataFrame) -> Result<Vec<SwingPoint>, ZoneError> {
        let high = data::column_to_f64(df, "high")?;
        let low = data::column_to_f64(df, "low")?;
        let times = data::timestamps(df)?;
        let n = high.len();
        let (left, right) = (self.params.left.max(1), self.params.right.max(1));
        if n < left + right + 1 {
            return Ok(Vec::new());
        }

        let mut pivots: Vec<SwingPoint> = Vec::new();
        for i in left..n - right {
            let h = high[i];
            if !h.is_nan()
                && high[i - left..i].iter().all(|&v| v.is_nan() || v < h)
                && high[i + 1..=i + right].iter().all(|&v| v.is_nan() || v <= h)
            {
                pivots.push(SwingPoint {
                    point_id: 0,
                    timestamp: times[i],
                    index: i,
                    price: h,
                    kind: SwingKind::Peak,
                });
            }
            let l = low[i];
            if !l.is_nan()
                && low[i - left..i].iter().all(|&v| v.is_nan() || v > l)
                && low[i + 1..=i + right].iter().all(|&v| v.is_nan() || v >= l)
            {
                pivots.push(SwingPoint {
                    point_id: 0,
                    timestamp: times[i],
                    index: i,
                    price: l,
                    kind: SwingKind::Trough,
                });
            }
        }

        let valid: Vec<f64> = high
            .iter()
            .zip(low.iter())
            .filter(|(h, l)| !h.is_nan() && !l.is_nan())
            .map(|(h, l)| (h + l) / 2.0)
            .collect();
        let mid_price = if valid.is_empty() {
            0.0
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        };
        let min_amplitude_abs = self.params.min_amplitude_pct * mid_price.abs();

        Ok(clean_pivots(pivots, 1, min_amplitude_abs))
    }
}

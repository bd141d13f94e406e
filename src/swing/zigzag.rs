//! ZigZag pivot detection: deviation-reversal extremes over close prices.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use super::{clean_pivots, SwingStrategy, ZigZagParams};
use crate::data;
use crate::errors::ZoneError;
use crate::models::{SwingKind, SwingPoint};

pub struct ZigZagSwing {
    params: ZigZagParams,
}

impl ZigZagSwing {
    pub fn new(params: ZigZagParams) -> Self {
        Self { params }
    }
}

impl SwingStrategy for ZigZagSwing {
    fn name(&self) -> &'static str {
        "zigzag"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        [
            ("legs".to_string(), self.params.legs as f64),
            ("deviation".to_string(), self.params.deviation),
        ]
        .into_iter()
        .collect()
    }

    fn find_pivots(&self, df: &DataFrame) -> Result<Vec<SwingPoint>, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let times = data::timestamps(df)?;
        let n = close.len();
        if n < 2 {
            return Ok(Vec::new());
        }
        let deviation = self.params.deviation;

        let mut raw: Vec<SwingPoint> = Vec::new();
        // Direction of the leg in progress: None until the first move exceeds
        // the deviation from the starting price.
        let mut direction: Option<bool> = None;
        let mut extreme_idx = 0usize;
        let mut extreme = close[0];

        let mut push = |idx: usize, price: f64, kind: SwingKind, raw: &mut Vec<SwingPoint>| {
            raw.push(SwingPoint {
                point_id: raw.len(),
                timestamp: times[idx],
                index: idx,
                price,
                kind,
            });
        };

        for (i, &price) in close.iter().enumerate().skip(1) {
            if price.is_nan() {
                continue;
            }
            match direction {
                None => {
                    if price >= extreme * (1.0 + deviation) {
                        push(extreme_idx, extreme, SwingKind::Trough, &mut raw);
                        direction = Some(true);
                        extreme = price;
                        extreme_idx = i;
                    } else if price <= extreme * (1.0 - deviation) {
                        push(extreme_idx, extreme, SwingKind::Peak, &mut raw);
                        direction = Some(false);
                        extreme = price;
                        extreme_idx = i;
                    }
                }
                Some(true) => {
                    if price > extreme {
                        extreme = price;
                        extreme_idx = i;
                    } else if price <= extreme * (1.0 - deviation) {
                        push(extreme_idx, extreme, SwingKind::Peak, &mut raw);
                        direction = Some(false);
                        extreme = price;
                        extreme_idx = i;
                    }
                }
                Some(false) => {
                    if price < extreme {
                        extreme = price;
                        extreme_idx = i;
                    } else if price >= extreme * (1.0 + deviation) {
                        push(extreme_idx, extreme, SwingKind::Trough, &mut raw);
                        direction = Some(true);
                        extreme = price;
                        extreme_idx = i;
                    }
                }
            }
        }

        // Trailing unconfirmed extreme closes the final leg.
        if let Some(dir) = direction {
            let kind = if dir { SwingKind::Peak } else { SwingKind::Trough };
            push(extreme_idx, extreme, kind, &mut raw);
        }

        Ok(clean_pivots(raw, self.params.legs, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TIME_COL;
    use chrono::NaiveDate;
    use polars::prelude::*;

    fn frame_from_close(close: &[f64]) -> DataFrame {
        let times: Vec<chrono::NaiveDateTime> = (0..close.len())
            .map(|h| {
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(h as i64)
            })
            .collect();
        df! { TIME_COL => &times, "close" => close }.unwrap()
    }

    fn strategy(deviation: f64) -> ZigZagSwing {
        ZigZagSwing::new(ZigZagParams { legs: 1, deviation })
    }

    #[test]
    fn v_shape_produces_three_pivots() {
        let close = [100.0, 95.0, 90.0, 95.0, 100.0, 105.0];
        let pivots = strategy(0.02).find_pivots(&frame_from_close(&close)).unwrap();
        let shape: Vec<(usize, SwingKind)> = pivots.iter().map(|p| (p.index, p.kind)).collect();
        assert_eq!(
            shape,
            vec![(0, SwingKind::Peak), (2, SwingKind::Trough), (5, SwingKind::Peak)]
        );
    }

    #[test]
    fn flat_series_has_no_pivots() {
        let close = [100.0; 10];
        let pivots = strategy(0.02).find_pivots(&frame_from_close(&close)).unwrap();
        assert!(pivots.is_empty());
    }

    #[test]
    fn small_wiggles_below_deviation_ignored() {
        let close = [100.0, 100.5, 99.8, 100.3, 99.9, 110.0];
        let pivots = strategy(0.05).find_pivots(&frame_from_close(&close)).unwrap();
        // One leg: the start trough plus the final extreme.
        assert_eq!(pivots.len(), 2);
        assert_eq!(pivots[0].kind, SwingKind::Trough);
        assert_eq!(pivots[1].kind, SwingKind::Peak);
    }

    #[test]
    fn pivots_alternate() {
        let close = [
            100.0, 106.0, 100.0, 107.0, 99.0, 108.0, 98.0, 109.0, 97.0, 110.0,
        ];
        let pivots = strategy(0.03).find_pivots(&frame_from_close(&close)).unwrap();
        assert!(pivots.len() >= 4);
        for pair in pivots.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn short_frame_is_empty() {
        let pivots = strategy(0.02).find_pivots(&frame_from_close(&[100.0])).unwrap();
        assert!(pivots.is_empty());
    }
}

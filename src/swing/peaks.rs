//! Prominence-based pivot detection over close prices, via the `find_peaks`
//! peak finder run on the series and its negation.

use std::collections::BTreeMap;

use find_peaks::PeakFinder;
use polars::prelude::DataFrame;

use super::{clean_pivots, FindPeaksParams, SwingStrategy};
use crate::data;
use crate::errors::ZoneError;
use crate::models::{SwingKind, SwingPoint};

pub struct FindPeaksSwing {
    params: FindPeaksParams,
}

impl FindPeaksSwing {
    pub fn new(params: FindPeaksParams) -> Self {
        Self { params }
    }
}

impl SwingStrategy for FindPeaksSwing {
    fn name(&self) -> &'static str {
        "find_peaks"
    }

    fn params(&self) -> BTreeMap<String, f64> {
        [
            ("prominence".to_string(), self.params.prominence),
            ("distance".to_string(), self.params.distance as f64),
            (
                "min_amplitude_pct".to_string(),
                self.params.min_amplitude_pct,
            ),
        ]
        .into_iter()
        .collect()
    }

    fn find_pivots(&self, df: &DataFrame) -> Result<Vec<SwingPoint>, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let times = data::timestamps(df)?;
        if close.len() < 3 {
            return Ok(Vec::new());
        }

        let valid: Vec<f64> = close.iter().copied().filter(|v| !v.is_nan()).collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }
        let mid_price = valid.iter().sum::<f64>() / valid.len() as f64;
        let prominence_abs = (self.params.prominence * mid_price.abs()).max(f64::EPSILON);

        let mut pivots: Vec<SwingPoint> = Vec::new();

        let mut finder = PeakFinder::new(&close);
        finder.with_min_prominence(prominence_abs);
        for peak in finder.find_peaks() {
            let idx = peak.middle_position();
            pivots.push(SwingPoint {
                point_id: 0,
                timestamp: times[idx],
                index: idx,
                price: close[idx],
                kind: SwingKind::Peak,
            });
        }

        let negated: Vec<f64> = close.iter().map(|v| -v).collect();
        let mut finder = PeakFinder::new(&negated);
        finder.with_min_prominence(prominence_abs);
        for trough in finder.find_peaks() {
            let idx = trough.middle_position();
            pivots.push(SwingPoint {
                point_id: 0,
                timestamp: times[idx],
                index: idx,
                price: close[idx],
                kind: SwingKind::Trough,
            });
        }

        let min_amplitude_abs = self.params.min_amplitude_pct * mid_price.abs();
        Ok(clean_pivots(
            pivots,
            self.params.distance,
            min_amplitude_abs,
        ))
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

    fn strategy() -> FindPeaksSwing {
        FindPeaksSwing::new(FindPeaksParams {
            prominence: 0.01,
            distance: 1,
            min_amplitude_pct: 0.005,
        })
    }

    #[test]
    fn single_hump_yields_one_peak() {
        let close = [100.0, 102.0, 106.0, 102.0, 100.0];
        let pivots = strategy().find_pivots(&frame_from_close(&close)).unwrap();
        let peaks: Vec<&SwingPoint> = pivots
            .iter()
            .filter(|p| p.kind == SwingKind::Peak)
            .collect();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 2);
        assert!((peaks[0].price - 106.0).abs() < f64::EPSILON);
    }

    #[test]
    fn w_shape_yields_troughs() {
        let close = [106.0, 100.0, 105.0, 99.0, 106.0];
        let pivots = strategy().find_pivots(&frame_from_close(&close)).unwrap();
        assert!(pivots.iter().any(|p| p.kind == SwingKind::Trough && p.index == 1));
        assert!(pivots.iter().any(|p| p.kind == SwingKind::Trough && p.index == 3));
    }

    #[test]
    fn pivots_alternate_after_cleaning() {
        let close = [100.0, 104.0, 99.0, 105.0, 98.0, 106.0, 100.0];
        let pivots = strategy().find_pivots(&frame_from_close(&close)).unwrap();
        for pair in pivots.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn tiny_frame_is_empty() {
        let pivots = strategy().find_pivots(&frame_from_close(&[100.0, 101.0])).unwrap();
        assert!(pivots.is_empty());
    }

    #[test]
    fn low_prominence_wiggles_filtered() {
        let close = [100.0, 100.05, 100.0, 100.06, 100.0, 100.04, 100.0];
        let pivots = strategy().find_pivots(&frame_from_close(&close)).unwrap();
        assert!(pivots.is_empty());
    }
}

#![allow(dead_code)]

use std::sync::Once;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use zonelab::data::TIME_COL;

/// Route engine tracing through the test harness (`RUST_LOG` controlled).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Hourly timestamps from 2024-01-01T00:00.
pub fn hourly_timestamps(n: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n).map(|h| start + chrono::Duration::hours(h as i64)).collect()
}

/// OHLCV frame with a smooth sine close around 100 and linear volume.
pub fn sample_ohlcv(n: usize) -> DataFrame {
    let times = hourly_timestamps(n);
    let close: Vec<f64> = (0..n)
        .map(|i| {
            let base = i as f64 * std::f64::consts::TAU / 48.0;
            100.0 + base.sin() * 5.0 + (base / 2.0).cos() * 2.0
        })
        .collect();
    let open: Vec<f64> = close.iter().map(|c| c - 0.2).collect();
    let high: Vec<f64> = close.iter().map(|c| c + 1.5).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 1.5).collect();
    let volume: Vec<f64> = (0..n).map(|i| 1000.0 + i as f64 * 10.0).collect();
    df! {
        TIME_COL => &times,
        "open" => &open,
        "high" => &high,
        "low" => &low,
        "close" => &close,
        "volume" => &volume,
    }
    .unwrap()
}

/// Attach an f64 column to a frame.
pub fn with_column(mut df: DataFrame, name: &str, values: Vec<f64>) -> DataFrame {
    df.with_column(Column::new(name.into(), values)).unwrap();
    df
}

/// `sin(2π·i / period)` oscillator, length `n`.
pub fn sine_oscillator(n: usize, period: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (std::f64::consts::TAU * i as f64 / period as f64).sin())
        .collect()
}

/// Exact ±1 square wave flipping every `half_period` bars, starting positive.
pub fn square_oscillator(n: usize, half_period: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if (i / half_period) % 2 == 0 { 1.0 } else { -1.0 })
        .collect()
}

/// Flat table at 100 with single-bar price spikes (alternating 110 / 90)
/// at evenly spaced pivot positions. Everything between the spikes is flat,
/// so isolated swing detection inside those stretches finds nothing.
pub fn spiked_ohlcv(n: usize, pivot_positions: &[usize]) -> DataFrame {
    let times = hourly_timestamps(n);
    let mut close = vec![100.0; n];
    for (k, &pos) in pivot_positions.iter().enumerate() {
        close[pos] = if k % 2 == 0 { 110.0 } else { 90.0 };
    }
    let open = close.clone();
    let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
    let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
    df! {
        TIME_COL => &times,
        "open" => &open,
        "high" => &high,
        "low" => &low,
        "close" => &close,
    }
    .unwrap()
}

/// Serialize a result with the run timestamp blanked, for equality checks
/// across repeated runs.
pub fn result_fingerprint(result: &zonelab::ZoneAnalysisResult) -> serde_json::Value {
    let mut value = serde_json::to_value(result).unwrap();
    value["metadata"]["analysis_timestamp"] = serde_json::Value::Null;
    value
}

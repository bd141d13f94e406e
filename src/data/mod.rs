//! Frame-level helpers shared by detection strategies and feature extraction.
//!
//! The engine works on a plain polars `DataFrame` with a `time` column of
//! dtype Datetime (the row key) and f64 price columns. Helpers here do the
//! column extraction and validation every stage depends on.

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::errors::ZoneError;

/// Row-key column carried by every input table.
pub const TIME_COL: &str = "time";

/// Columns that are never considered oscillator candidates during fallback
/// resolution: price data, time data, and auxiliary series.
const NON_OSCILLATOR_COLS: &[&str] = &[
    "open", "high", "low", "close", "volume", "time", "timestamp", "date", "datetime", "atr",
    "true_range", "tr", "index", "id", "zone_id",
];

/// Column names present in the frame.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(std::string::ToString::to_string)
        .collect()
}

/// Extract a column as a dense `Vec<f64>`, casting if needed. Nulls become NaN.
pub fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, ZoneError> {
    let col = df
        .column(name)
        .map_err(|_| ZoneError::missing_column(name, &column_names(df)))?;
    let casted = col.cast(&DataType::Float64).map_err(|_| {
        ZoneError::Data(format!(
            "column '{name}' is not numeric (dtype {})",
            col.dtype()
        ))
    })?;
    let ca = casted.f64()?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Extract the `time` column as naive timestamps.
/// Handles both Datetime (any unit) and Date columns.
pub fn timestamps(df: &DataFrame) -> Result<Vec<NaiveDateTime>, ZoneError> {
    let col = df
        .column(TIME_COL)
        .map_err(|_| ZoneError::missing_column(TIME_COL, &column_names(df)))?;
    timestamps_from_column(col)
}

/// Extract naive timestamps from any Datetime/Date column.
pub fn timestamps_from_column(col: &Column) -> Result<Vec<NaiveDateTime>, ZoneError> {
    match col.dtype() {
        DataType::Datetime(tu, _) => {
            let ca = col.datetime()?;
            let mut out = Vec::with_capacity(ca.len());
            for idx in 0..ca.len() {
                let raw = ca
                    .phys
                    .get(idx)
                    .ok_or_else(|| ZoneError::Data(format!("null timestamp at row {idx}")))?;
                let ndt = match tu {
                    TimeUnit::Milliseconds => {
                        chrono::DateTime::from_timestamp_millis(raw).map(|dt| dt.naive_utc())
                    }
                    TimeUnit::Microseconds => {
                        chrono::DateTime::from_timestamp_micros(raw).map(|dt| dt.naive_utc())
                    }
                    TimeUnit::Nanoseconds => {
                        Some(chrono::DateTime::from_timestamp_nanos(raw).naive_utc())
                    }
                };
                out.push(ndt.ok_or_else(|| {
                    ZoneError::Data(format!("invalid timestamp at row {idx}: {raw}"))
                })?);
            }
            Ok(out)
        }
        DataType::Date => {
            let ca = col.date()?;
            let mut out = Vec::with_capacity(ca.len());
            for idx in 0..ca.len() {
                let days = ca
                    .phys
                    .get(idx)
                    .ok_or_else(|| ZoneError::Data(format!("null date at row {idx}")))?;
                // epoch offset: days from CE to 1970-01-01
                let date = chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163)
                    .ok_or_else(|| ZoneError::Data(format!("invalid date at row {idx}")))?;
                out.push(date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
            }
            Ok(out)
        }
        other => Err(ZoneError::Data(format!(
            "'{TIME_COL}' column must be Datetime or Date, got {other}"
        ))),
    }
}

/// Validate that the frame is a usable OHLCV table: non-empty, carries the four
/// price columns plus the time row key, and timestamps are non-decreasing.
pub fn validate_ohlcv(df: &DataFrame) -> Result<(), ZoneError> {
    if df.height() == 0 {
        return Err(ZoneError::Data("input table is empty".into()));
    }
    let available = column_names(df);
    for required in ["open", "high", "low", "close"] {
        if !available.iter().any(|c| c == required) {
            return Err(ZoneError::missing_column(required, &available));
        }
    }
    let times = timestamps(df)?;
    if times.windows(2).any(|w| w[1] < w[0]) {
        return Err(ZoneError::Data(
            "timestamps must be monotonically non-decreasing".into(),
        ));
    }
    Ok(())
}

/// First numeric column that is not OHLCV/time/ATR-like: the generic
/// oscillator fallback used when a zone has no indicator context.
pub fn fallback_oscillator(df: &DataFrame) -> Option<String> {
    df.columns().iter().find_map(|col| {
        let name = col.name().as_str();
        if NON_OSCILLATOR_COLS.contains(&name.to_lowercase().as_str()) {
            return None;
        }
        if col.dtype().is_primitive_numeric() {
            Some(name.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_frame() -> DataFrame {
        let times: Vec<NaiveDateTime> = (0..4)
            .map(|h| {
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(h, 0, 0)
                    .unwrap()
            })
            .collect();
        df! {
            TIME_COL => &times,
            "open" => &[1.0, 2.0, 3.0, 4.0],
            "high" => &[1.5, 2.5, 3.5, 4.5],
            "low" => &[0.5, 1.5, 2.5, 3.5],
            "close" => &[1.2, 2.2, 3.2, 4.2],
            "osc" => &[-1.0, 1.0, 2.0, -2.0],
        }
        .unwrap()
    }

    #[test]
    fn column_to_f64_extracts_values() {
        let df = sample_frame();
        let vals = column_to_f64(&df, "close").unwrap();
        assert_eq!(vals, vec![1.2, 2.2, 3.2, 4.2]);
    }

    #[test]
    fn column_to_f64_missing_lists_available() {
        let df = sample_frame();
        let err = column_to_f64(&df, "rsi").unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn timestamps_are_hourly() {
        let df = sample_frame();
        let ts = timestamps(&df).unwrap();
        assert_eq!(ts.len(), 4);
        assert_eq!((ts[1] - ts[0]).num_hours(), 1);
    }

    #[test]
    fn validate_accepts_well_formed_frame() {
        assert!(validate_ohlcv(&sample_frame()).is_ok());
    }

    #[test]
    fn validate_rejects_empty_frame() {
        let df = sample_frame().slice(0, 0);
        let err = validate_ohlcv(&df).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn fallback_skips_price_and_time_columns() {
        let df = sample_frame();
        assert_eq!(fallback_oscillator(&df), Some("osc".to_string()));
    }

    #[test]
    fn fallback_none_without_candidates() {
        let df = sample_frame().drop("osc").unwrap();
        assert_eq!(fallback_oscillator(&df), None);
    }
}

//! Built-in indicator implementations backed by rust_ti.

use std::collections::BTreeMap;

use polars::prelude::*;
use rust_ti::standard_indicators::bulk as sti;

use super::{pad_front, Indicator, IndicatorResult};
use crate::data;
use crate::errors::ZoneError;

pub(crate) const CUSTOM_INDICATORS: &[&str] =
    &["macd", "rsi", "sma", "ema", "ao", "atr", "bollinger"];

pub(crate) fn build(
    name: &str,
    params: &BTreeMap<String, f64>,
) -> Result<Box<dyn Indicator>, ZoneError> {
    let params = params.clone();
    match name {
        "macd" => Ok(Box::new(Macd {
            fast: param_usize(&params, "fast_period", 12),
            slow: param_usize(&params, "slow_period", 26),
            signal: param_usize(&params, "signal_period", 9),
        })),
        "rsi" => Ok(Box::new(Rsi {
            period: param_usize(&params, "period", 14),
        })),
        "sma" => Ok(Box::new(MovingAvg {
            period: param_usize(&params, "period", 20),
            exponential: false,
        })),
        "ema" => Ok(Box::new(MovingAvg {
            period: param_usize(&params, "period", 20),
            exponential: true,
        })),
        "ao" => Ok(Box::new(AwesomeOscillator {
            fast: param_usize(&params, "fast", 5),
            slow: param_usize(&params, "slow", 34),
        })),
        "atr" => Ok(Box::new(Atr {
            period: param_usize(&params, "period", 14),
        })),
        "bollinger" => Ok(Box::new(Bollinger {
            period: param_usize(&params, "period", 20),
            multiplier: params.get("multiplier").copied().unwrap_or(2.0),
        })),
        other => Err(ZoneError::Configuration(format!(
            "unknown custom indicator '{other}'. Available: {}",
            CUSTOM_INDICATORS.join(", ")
        ))),
    }
}

fn param_usize(params: &BTreeMap<String, f64>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .map_or(default, |v| v.round().max(1.0) as usize)
}

fn require_rows(df: &DataFrame, needed: usize, name: &str) -> Result<(), ZoneError> {
    if df.height() < needed {
        return Err(ZoneError::Indicator(format!(
            "{name} needs at least {needed} rows, got {}",
            df.height()
        )));
    }
    Ok(())
}

fn columns_result(
    n: usize,
    columns: Vec<(String, Vec<f64>)>,
) -> Result<IndicatorResult, ZoneError> {
    let mut series = Vec::with_capacity(columns.len());
    let mut names = Vec::with_capacity(columns.len());
    for (name, values) in columns {
        debug_assert_eq!(values.len(), n);
        series.push(Column::new(PlSmallStr::from(name.as_str()), values));
        names.push(name);
    }
    let data = DataFrame::new(n, series)?;
    Ok(IndicatorResult {
        data,
        columns: names,
    })
}

/// MACD line, signal line, and histogram. Standard 12/26/9 uses the
/// rust_ti standard indicator; other periods go through the generic
/// momentum functions with exponential models.
#[derive(Debug)]
struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let n = close.len();
        require_rows(df, self.slow + self.signal, "macd")?;

        let (macd, signal, hist) = if (self.fast, self.slow, self.signal) == (12, 26, 9) {
            let triples = sti::macd(&close);
            let macd: Vec<f64> = triples.iter().map(|t| t.0).collect();
            let signal: Vec<f64> = triples.iter().map(|t| t.1).collect();
            let hist: Vec<f64> = triples.iter().map(|t| t.2).collect();
            (macd, signal, hist)
        } else {
            let macd = rust_ti::momentum_indicators::bulk::macd_line(
                &close,
                self.fast,
                rust_ti::ConstantModelType::ExponentialMovingAverage,
                self.slow,
                rust_ti::ConstantModelType::ExponentialMovingAverage,
            );
            let signal = rust_ti::momentum_indicators::bulk::signal_line(
                &macd,
                rust_ti::ConstantModelType::ExponentialMovingAverage,
                self.signal,
            );
            // Align the two series on their common (latest) suffix.
            let macd_tail = &macd[macd.len() - signal.len()..];
            let hist: Vec<f64> = macd_tail
                .iter()
                .zip(signal.iter())
                .map(|(m, s)| m - s)
                .collect();
            (macd_tail.to_vec(), signal, hist)
        };

        columns_result(
            n,
            vec![
                ("macd".to_string(), pad_front(&macd, n)),
                ("macd_signal".to_string(), pad_front(&signal, n)),
                ("macd_hist".to_string(), pad_front(&hist, n)),
            ],
        )
    }
}

/// Relative Strength Index over `close`.
#[derive(Debug)]
struct Rsi {
    period: usize,
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let n = close.len();
        require_rows(df, self.period + 1, "rsi")?;

        let values = if self.period == 14 {
            sti::rsi(&close)
        } else {
            rust_ti::momentum_indicators::bulk::relative_strength_index(
                &close,
                rust_ti::ConstantModelType::SmoothedMovingAverage,
                self.period,
            )
        };

        columns_result(
            n,
            vec![(format!("rsi_{}", self.period), pad_front(&values, n))],
        )
    }
}

/// Simple or exponential moving average over `close`.
#[derive(Debug)]
struct MovingAvg {
    period: usize,
    exponential: bool,
}

impl Indicator for MovingAvg {
    fn name(&self) -> &str {
        if self.exponential {
            "ema"
        } else {
            "sma"
        }
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let n = close.len();
        require_rows(df, self.period, self.name())?;

        let ma_type = if self.exponential {
            rust_ti::MovingAverageType::Exponential
        } else {
            rust_ti::MovingAverageType::Simple
        };
        let values =
            rust_ti::moving_average::bulk::moving_average(&close, ma_type, self.period);

        columns_result(
            n,
            vec![(
                format!("{}_{}", self.name(), self.period),
                pad_front(&values, n),
            )],
        )
    }
}

/// Awesome Oscillator: SMA(fast) - SMA(slow) of the bar midprice.
#[derive(Debug)]
struct AwesomeOscillator {
    fast: usize,
    slow: usize,
}

impl Indicator for AwesomeOscillator {
    fn name(&self) -> &str {
        "ao"
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let high = data::column_to_f64(df, "high")?;
        let low = data::column_to_f64(df, "low")?;
        let n = high.len();
        require_rows(df, self.slow, "ao")?;

        let mid: Vec<f64> = high
            .iter()
            .zip(low.iter())
            .map(|(h, l)| (h + l) / 2.0)
            .collect();
        let fast = rust_ti::moving_average::bulk::moving_average(
            &mid,
            rust_ti::MovingAverageType::Simple,
            self.fast,
        );
        let slow = rust_ti::moving_average::bulk::moving_average(
            &mid,
            rust_ti::MovingAverageType::Simple,
            self.slow,
        );
        let fast = pad_front(&fast, n);
        let slow = pad_front(&slow, n);
        let ao: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();

        columns_result(
            n,
            vec![(format!("ao_{}_{}", self.fast, self.slow), ao)],
        )
    }
}

/// Average True Range over rolling windows of `close`/`high`/`low`.
#[derive(Debug)]
struct Atr {
    period: usize,
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let high = data::column_to_f64(df, "high")?;
        let low = data::column_to_f64(df, "low")?;
        let n = close.len();
        require_rows(df, self.period, "atr")?;

        let values: Vec<f64> = (0..=n - self.period)
            .map(|i| {
                let end = i + self.period;
                rust_ti::other_indicators::single::average_true_range(
                    &close[i..end],
                    &high[i..end],
                    &low[i..end],
                    rust_ti::ConstantModelType::SimpleMovingAverage,
                )
            })
            .collect();

        columns_result(n, vec![("atr".to_string(), pad_front(&values, n))])
    }
}

/// Bollinger bands: SMA center with `multiplier` standard deviations.
#[derive(Debug)]
struct Bollinger {
    period: usize,
    multiplier: f64,
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn calculate(&self, df: &DataFrame) -> Result<IndicatorResult, ZoneError> {
        let close = data::column_to_f64(df, "close")?;
        let n = close.len();
        require_rows(df, self.period, "bollinger")?;

        let bands = rust_ti::candle_indicators::bulk::moving_constant_bands(
            &close,
            rust_ti::ConstantModelType::SimpleMovingAverage,
            rust_ti::DeviationModel::StandardDeviation,
            self.multiplier,
            self.period,
        );
        let lower: Vec<f64> = bands.iter().map(|t| t.0).collect();
        let mid: Vec<f64> = bands.iter().map(|t| t.1).collect();
        let upper: Vec<f64> = bands.iter().map(|t| t.2).collect();

        let p = self.period;
        columns_result(
            n,
            vec![
                (format!("bb_lower_{p}"), pad_front(&lower, n)),
                (format!("bb_mid_{p}"), pad_front(&mid, n)),
                (format!("bb_upper_{p}"), pad_front(&upper, n)),
            ],
        )
    }
}

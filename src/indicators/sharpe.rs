//! Rolling Sharpe ratio: annualized mean/stdev of log returns
//! over a rolling window, with the annualization factor inferred from the
//! series' bar size.

use crate::bars::BarSize;
use crate::series::{Point, Series};

fn periods_per_year(bar_size: BarSize) -> f64 {
    const TRADING_DAYS_PER_YEAR: f64 = 252.0;
    if bar_size == BarSize::OneDay {
        TRADING_DAYS_PER_YEAR
    } else {
        (bar_size.trading_seconds_per_day() / bar_size.seconds() as f64) * TRADING_DAYS_PER_YEAR
    }
}

fn log_returns(points: &[Point]) -> Vec<Option<f64>> {
    let mut out = vec![None; points.len()];
    for i in 1..points.len() {
        if let (Some(prev), Some(curr)) = (points[i - 1].v, points[i].v) {
            if prev > 0.0 && curr > 0.0 {
                out[i] = Some((curr / prev).ln());
            }
        }
    }
    out
}

pub fn sharpe(points: &[Point], bar_size: BarSize, window: usize) -> Series {
    let returns = log_returns(points);
    let annualization = periods_per_year(bar_size).sqrt();
    let mut out = Vec::with_capacity(points.len());

    for i in 0..points.len() {
        let v = if window == 0 || i + 1 < window {
            None
        } else {
            let slice = &returns[i + 1 - window..=i];
            if slice.iter().all(Option::is_some) && window > 1 {
                let values: Vec<f64> = slice.iter().map(|r| r.unwrap()).collect();
                let mean = values.iter().sum::<f64>() / window as f64;
                let variance =
                    values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (window as f64 - 1.0);
                let stdev = variance.sqrt();
                if stdev == 0.0 {
                    None
                } else {
                    Some(mean / stdev * annualization)
                }
            } else {
                None
            }
        };
        out.push(Point { t: points[i].t, v });
    }

    Series { label: "sharpe".into(), points: out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(values: &[f64]) -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Point {
                t: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(i as i64),
                v: Some(*v),
            })
            .collect()
    }

    #[test]
    fn constant_returns_yield_no_volatility_undefined_sharpe() {
        let input = series(&[100.0, 101.0, 102.01, 103.0301]);
        let result = sharpe(&input, BarSize::OneDay, 3);
        // Near-identical daily returns drive stdev toward zero; either an
        // undefined value or a very large magnitude is acceptable, but it
        // must not be NaN.
        for p in &result.points {
            if let Some(v) = p.v {
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn undefined_before_window_fills() {
        let input = series(&[100.0, 102.0, 101.0, 105.0, 103.0]);
        let result = sharpe(&input, BarSize::OneDay, 3);
        assert!(result.points[0].v.is_none());
        assert!(result.points[1].v.is_none());
    }
}

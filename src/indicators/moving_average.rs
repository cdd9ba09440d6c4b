//! SMA/EMA. Both are undefined for their first `N-1` points;
//! EMA is seeded with the first defined SMA value.

use crate::series::Point;

/// Simple moving average over the last `window` *defined* values seen so
/// far; an undefined input resets the running window (it cannot be
/// bridged), matching the "undefined operand yields an undefined indicator
/// value" edge rule.
pub fn sma(points: &[Point], window: usize) -> Vec<Point> {
    let mut out = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        let v = if i + 1 < window {
            None
        } else {
            let slice = &points[i + 1 - window..=i];
            if slice.iter().all(|p| p.v.is_some()) {
                Some(slice.iter().map(|p| p.v.unwrap()).sum::<f64>() / window as f64)
            } else {
                None
            }
        };
        out.push(Point { t: points[i].t, v });
    }
    out
}

pub fn ema(points: &[Point], window: usize) -> Vec<Point> {
    let mut out = Vec::with_capacity(points.len());
    let alpha = 2.0 / (window as f64 + 1.0);
    let sma_series = sma(points, window);
    let mut prev: Option<f64> = None;
    for (i, p) in points.iter().enumerate() {
        let v = match (prev, p.v) {
            (Some(prev_ema), Some(x)) => Some(alpha * x + (1.0 - alpha) * prev_ema),
            (None, _) => sma_series[i].v,
            (Some(_), None) => None,
        };
        prev = v;
        out.push(Point { t: p.t, v });
    }
    out
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
    fn sma_matches_literal_scenario() {
        let input = series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0]);
        let result = sma(&input, 3);
        let defined: Vec<f64> = result.iter().filter_map(|p| p.v).collect();
        assert_eq!(defined, vec![11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0]);
        assert!(result[0].v.is_none());
        assert!(result[1].v.is_none());
    }

    #[test]
    fn sma_is_undefined_for_first_n_minus_one() {
        let input = series(&[1.0, 2.0, 3.0, 4.0]);
        let result = sma(&input, 4);
        assert_eq!(result.iter().filter(|p| p.v.is_some()).count(), 1);
    }

    #[test]
    fn ema_matches_sma_at_seed_index() {
        let input = series(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let sma_result = sma(&input, 3);
        let ema_result = ema(&input, 3);
        assert!((ema_result[2].v.unwrap() - sma_result[2].v.unwrap()).abs() < 1e-9);
    }

    #[test]
    fn single_bar_returns_no_defined_values_for_window_above_one() {
        let input = series(&[5.0]);
        let result = sma(&input, 3);
        assert!(result.iter().all(|p| p.v.is_none()));
    }
}

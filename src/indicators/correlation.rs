//! Rolling Pearson correlation of H-bar log returns between two series.
//! The two input series must already share one timestamp index (the
//! caller aligns them the same way the evaluator aligns legs).

use crate::series::{Point, Series};

fn h_bar_log_returns(points: &[Point], horizon: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; points.len()];
    if horizon == 0 {
        return out;
    }
    for i in horizon..points.len() {
        if let (Some(prev), Some(curr)) = (points[i - horizon].v, points[i].v) {
            if prev > 0.0 && curr > 0.0 {
                out[i] = Some((curr / prev).ln());
            }
        }
    }
    out
}

pub fn correlation(a: &[Point], b: &[Point], ret_horizon: usize, window: usize) -> Series {
    assert_eq!(a.len(), b.len(), "correlation inputs must share one timestamp index");
    let ra = h_bar_log_returns(a, ret_horizon);
    let rb = h_bar_log_returns(b, ret_horizon);

    let mut out = Vec::with_capacity(a.len());
    for i in 0..a.len() {
        let v = if window < 2 || i + 1 < window {
            None
        } else {
            let sa = &ra[i + 1 - window..=i];
            let sb = &rb[i + 1 - window..=i];
            pearson(sa, sb)
        };
        out.push(Point { t: a[i].t, v });
    }

    Series { label: "corr".into(), points: out }
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    if !a.iter().all(Option::is_some) || !b.iter().all(Option::is_some) {
        return None;
    }
    let xs: Vec<f64> = a.iter().map(|v| v.unwrap()).collect();
    let ys: Vec<f64> = b.iter().map(|v| v.unwrap()).collect();
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
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
    fn perfectly_correlated_series_reads_one() {
        let a = series(&[100.0, 101.0, 102.0, 103.5, 105.0, 107.0, 109.0]);
        let b: Vec<Point> = a.iter().map(|p| Point { t: p.t, v: p.v.map(|v| v * 2.0) }).collect();
        let result = correlation(&a, &b, 1, 4);
        let last = result.points.last().unwrap().v.unwrap();
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inversely_correlated_series_reads_negative_one() {
        let a = series(&[100.0, 102.0, 101.0, 105.0, 103.0, 108.0]);
        let b = series(&[100.0, 98.0, 99.0, 95.0, 97.0, 92.0]);
        let result = correlation(&a, &b, 1, 4);
        let last = result.points.last().unwrap().v.unwrap();
        assert!(last < 0.0);
    }
}

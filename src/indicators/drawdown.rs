//! Drawdown, point and rolling-window variants:
//! `100 * (price - runningMax) / runningMax`.

use crate::series::{Point, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Point,
    Rolling(usize),
}

pub fn drawdown(points: &[Point], mode: Mode) -> Series {
    let mut out = Vec::with_capacity(points.len());
    let mut running_max: Option<f64> = None;

    for (i, p) in points.iter().enumerate() {
        let Some(price) = p.v else {
            out.push(Point { t: p.t, v: None });
            continue;
        };

        let window_max = match mode {
            Mode::Point => {
                running_max = Some(running_max.map_or(price, |m| m.max(price)));
                running_max.unwrap()
            }
            Mode::Rolling(window) => {
                let start = i.saturating_sub(window.saturating_sub(1));
                points[start..=i].iter().filter_map(|p| p.v).fold(price, f64::max)
            }
        };

        let v = if window_max == 0.0 {
            None
        } else {
            Some(100.0 * (price - window_max) / window_max)
        };
        out.push(Point { t: p.t, v });
    }

    Series { label: "drawdown".into(), points: out }
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
    fn point_drawdown_never_exceeds_zero() {
        let input = series(&[10.0, 12.0, 9.0, 14.0, 8.0]);
        let result = drawdown(&input, Mode::Point);
        for p in &result.points {
            assert!(p.v.unwrap() <= 0.0);
        }
        assert_eq!(result.points[0].v, Some(0.0));
    }

    #[test]
    fn rolling_drawdown_only_looks_back_window_bars() {
        let input = series(&[10.0, 20.0, 5.0, 5.0, 5.0]);
        let result = drawdown(&input, Mode::Rolling(2));
        // At the last point the window is [5.0, 5.0]; the prior peak of 20
        // has rolled out of view, so drawdown should read 0, not -75.
        assert_eq!(result.points[4].v, Some(0.0));
    }
}

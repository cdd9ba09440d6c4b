//! Rolling Z-score: `(x - mean_W) / stdev_W`, plus one constant
//! sub-series per requested level.

use crate::series::{Point, Series};

pub struct ZScore {
    pub zscore: Series,
    pub levels: Vec<Series>,
}

pub fn zscore(points: &[Point], window: usize, levels: &[f64]) -> ZScore {
    let mut out = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        let v = if window < 2 || i + 1 < window {
            None
        } else {
            let slice = &points[i + 1 - window..=i];
            if slice.iter().all(|p| p.v.is_some()) {
                let values: Vec<f64> = slice.iter().map(|p| p.v.unwrap()).collect();
                let mean = values.iter().sum::<f64>() / window as f64;
                let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (window as f64 - 1.0);
                let stdev = variance.sqrt();
                if stdev == 0.0 {
                    None
                } else {
                    points[i].v.map(|x| (x - mean) / stdev)
                }
            } else {
                None
            }
        };
        out.push(Point { t: points[i].t, v });
    }

    let zscore_series = Series { label: "zscore".into(), points: out };
    let level_series = levels
        .iter()
        .map(|level| Series::constant(format!("level_{level}"), &zscore_series, *level))
        .collect();

    ZScore { zscore: zscore_series, levels: level_series }
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
    fn zscore_of_constant_window_is_undefined() {
        let input = series(&[5.0, 5.0, 5.0, 5.0]);
        let result = zscore(&input, 3, &[2.0]);
        assert!(result.zscore.points[2].v.is_none());
    }

    #[test]
    fn one_level_series_per_requested_level() {
        let input = series(&[1.0, 2.0, 3.0, 10.0]);
        let result = zscore(&input, 3, &[1.0, 2.0, -2.0]);
        assert_eq!(result.levels.len(), 3);
    }
}

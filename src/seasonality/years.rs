//! Years mode: one rebased curve per requested year, plus a
//! mean curve and P0/P50/P100 percentile bands across included years.

use std::collections::BTreeMap;

use chrono::Datelike;

use crate::series::{EngineResult, Point, ResultKind, Series};

use super::{day_of_year_index, reference_date};

pub struct YearsRequest<'a> {
    pub points: &'a [Point],
    pub years: &'a [i32],
    /// `true` rebases each year to percent change from its first point;
    /// `false` indexes to 100 at the first point.
    pub rebase_pct: bool,
    pub min_points_per_year: usize,
}

pub fn years(req: YearsRequest<'_>) -> EngineResult {
    let mut per_year = Vec::with_capacity(req.years.len());
    // index -> Vec<(year, value)> across included years, for band/mean math.
    let mut by_index: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut warnings = Vec::new();

    for &year in req.years {
        let year_points: Vec<&Point> = req.points.iter().filter(|p| p.t.year() == year).collect();
        let defined_count = year_points.iter().filter(|p| p.v.is_some()).count();
        let included = defined_count >= req.min_points_per_year;
        if !included {
            warnings.push(format!("{year}: only {defined_count} points, excluded from bands"));
        }

        let base = year_points.iter().find_map(|p| p.v);
        let mut curve = Vec::with_capacity(year_points.len());
        for p in &year_points {
            let v = match (p.v, base) {
                (Some(x), Some(b)) if b != 0.0 => {
                    Some(if req.rebase_pct { (x - b) / b * 100.0 } else { x / b * 100.0 })
                }
                _ => None,
            };
            let index = day_of_year_index(p.t);
            if included {
                if let Some(value) = v {
                    by_index.entry(index).or_default().push(value);
                }
            }
            curve.push(Point { t: reference_date(index), v });
        }
        per_year.push(Series { label: year.to_string(), points: curve });
    }

    let mut mean_points = Vec::with_capacity(by_index.len());
    let mut p0_points = Vec::with_capacity(by_index.len());
    let mut p50_points = Vec::with_capacity(by_index.len());
    let mut p100_points = Vec::with_capacity(by_index.len());

    for (&index, values) in &by_index {
        let t = reference_date(index);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        mean_points.push(Point { t, v: Some(mean) });
        p0_points.push(Point { t, v: sorted.first().copied() });
        p100_points.push(Point { t, v: sorted.last().copied() });
        p50_points.push(Point { t, v: Some(percentile(&sorted, 0.5)) });
    }

    let mut series = per_year;
    series.push(Series { label: "mean".into(), points: mean_points });
    series.push(Series { label: "p0".into(), points: p0_points });
    series.push(Series { label: "p50".into(), points: p50_points });
    series.push(Series { label: "p100".into(), points: p100_points });

    EngineResult {
        kind: ResultKind::Chart,
        label: "Seasonality(years)".into(),
        series,
        tables: None,
        warning: if warnings.is_empty() { None } else { Some(warnings.join("; ")) },
        back_adjusted: false,
        rolled: false,
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn points_for(year: i32, values: &[f64]) -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Point {
                t: Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(i as i64),
                v: Some(*v),
            })
            .collect()
    }

    #[test]
    fn each_year_curve_starts_at_zero_when_rebased_pct() {
        let mut points = points_for(2022, &[100.0, 110.0, 90.0]);
        points.extend(points_for(2023, &[50.0, 55.0, 45.0]));
        let result = years(YearsRequest {
            points: &points,
            years: &[2022, 2023],
            rebase_pct: true,
            min_points_per_year: 1,
        });
        for series in &result.series[..2] {
            assert_eq!(series.points[0].v, Some(0.0));
        }
    }

    #[test]
    fn years_below_minimum_points_are_excluded_from_bands() {
        let mut points = points_for(2022, &[100.0, 101.0, 102.0, 103.0, 104.0]);
        points.extend(points_for(2023, &[50.0]));
        let result = years(YearsRequest {
            points: &points,
            years: &[2022, 2023],
            rebase_pct: true,
            min_points_per_year: 3,
        });
        assert!(result.warning.is_some());
    }
}

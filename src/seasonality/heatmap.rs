//! Heatmap mode: bucket a series' returns by month or ISO week
//! within each year and compute per-bucket aggregate statistics.

use chrono::Datelike;

use crate::series::{EngineResult, Point, ResultKind, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Month,
    IsoWeek,
}

impl Bucket {
    fn key(self, p: &Point) -> u32 {
        match self {
            Bucket::Month => p.t.month(),
            Bucket::IsoWeek => p.t.iso_week().week(),
        }
    }
}

struct Cell {
    year: i32,
    bucket: u32,
    return_pct: Option<f64>,
    included: bool,
}

pub fn heatmap(points: &[Point], bucket: Bucket, min_points_per_bucket: usize) -> EngineResult {
    let mut cells: Vec<Cell> = Vec::new();

    let mut years: Vec<i32> = points.iter().map(|p| p.t.year()).collect();
    years.sort_unstable();
    years.dedup();

    for year in years {
        let year_points: Vec<&Point> = points.iter().filter(|p| p.t.year() == year).collect();
        let mut buckets: Vec<u32> = year_points.iter().map(|p| bucket.key(p)).collect();
        buckets.sort_unstable();
        buckets.dedup();

        for b in buckets {
            let in_bucket: Vec<&Point> = year_points.iter().filter(|p| bucket.key(p) == b).copied().collect();
            let defined: Vec<f64> = in_bucket.iter().filter_map(|p| p.v).collect();
            let included = defined.len() >= min_points_per_bucket;
            let return_pct = bucket_return(&in_bucket);
            cells.push(Cell { year, bucket: b, return_pct, included });
        }
    }

    let rows: Vec<serde_json::Value> = cells
        .iter()
        .map(|c| {
            serde_json::json!({
                "year": c.year,
                "bucket": c.bucket,
                "return_pct": c.return_pct,
                "included": c.included,
            })
        })
        .collect();

    let mut stats_by_bucket: std::collections::BTreeMap<u32, Vec<f64>> = std::collections::BTreeMap::new();
    for c in &cells {
        if c.included {
            if let Some(r) = c.return_pct {
                stats_by_bucket.entry(c.bucket).or_default().push(r);
            }
        }
    }

    let stats_rows: Vec<serde_json::Value> = stats_by_bucket
        .into_iter()
        .map(|(bucket, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let median = if values.len() % 2 == 0 {
                (values[values.len() / 2 - 1] + values[values.len() / 2]) / 2.0
            } else {
                values[values.len() / 2]
            };
            let variance = if values.len() > 1 {
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
            } else {
                0.0
            };
            let positive = values.iter().filter(|v| **v > 0.0).count() as f64 / n;
            let negative = values.iter().filter(|v| **v < 0.0).count() as f64 / n;
            serde_json::json!({
                "bucket": bucket,
                "mean": mean,
                "median": median,
                "min": values.first(),
                "max": values.last(),
                "stdev": variance.sqrt(),
                "pct_positive": positive,
                "pct_negative": negative,
                "samples": values.len(),
            })
        })
        .collect();

    let mut tables = std::collections::HashMap::new();
    tables.insert("cells".to_owned(), Table::Rows(rows));
    tables.insert("stats".to_owned(), Table::Rows(stats_rows));

    EngineResult {
        kind: ResultKind::Table,
        label: "Seasonality(heatmap)".into(),
        series: vec![],
        tables: Some(tables),
        warning: None,
        back_adjusted: false,
        rolled: false,
    }
}

/// Compound the bucket's point-to-point returns into one return, treating
/// any point-to-point gap as a skipped step rather than a zero return.
fn bucket_return(points: &[&Point]) -> Option<f64> {
    let defined: Vec<f64> = points.iter().filter_map(|p| p.v).collect();
    if defined.len() < 2 {
        return None;
    }
    let mut compounded = 1.0;
    for w in defined.windows(2) {
        let (prev, curr) = (w[0], w[1]);
        if prev == 0.0 {
            continue;
        }
        compounded *= 1.0 + (curr - prev) / prev;
    }
    Some((compounded - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn point(y: i32, m: u32, d: u32, v: f64) -> Point {
        Point { t: Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(), v: Some(v) }
    }

    #[test]
    fn monthly_bucket_compounds_return() {
        let points = vec![point(2024, 1, 1, 100.0), point(2024, 1, 15, 110.0), point(2024, 1, 31, 121.0)];
        let result = heatmap(&points, Bucket::Month, 1);
        let Some(Table::Rows(cells)) = result.tables.as_ref().unwrap().get("cells") else {
            panic!("expected cells table");
        };
        let ret = cells[0]["return_pct"].as_f64().unwrap();
        assert!((ret - 21.0).abs() < 1e-6);
    }

    #[test]
    fn bucket_below_minimum_is_excluded_from_stats() {
        let points = vec![point(2024, 1, 1, 100.0)];
        let result = heatmap(&points, Bucket::Month, 2);
        let Some(Table::Rows(cells)) = result.tables.as_ref().unwrap().get("cells") else {
            panic!("expected cells table");
        };
        assert_eq!(cells[0]["included"], false);
    }
}

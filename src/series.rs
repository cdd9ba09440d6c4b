//! The chart contract and the internal series/result types that
//! feed it. All endpoints serialize through [`ChartContract`]; the
//! underlying dynamically-shaped result is [`EngineResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bars::BarSize;

/// One (timestamp, value) sample. `v` is `None` for an explicit gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "t", with = "ts_millis")]
    pub t: DateTime<Utc>,
    #[serde(rename = "v")]
    pub v: Option<f64>,
}

mod ts_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(t.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = i64::deserialize(d)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// A named, ordered series of points. `S.points` is always strictly
/// increasing in `t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            points: Vec::new(),
        }
    }

    pub fn is_sorted_strict(&self) -> bool {
        self.points.windows(2).all(|w| w[0].t < w[1].t)
    }

    /// A series holding the same value at every timestamp of `like`,
    /// used for RSI's `overbought`/`oversold` bands and Z-score's level
    /// lines: constants are represented as one-point-per-sample series so
    /// every series in a result shares the same point count.
    pub fn constant(label: impl Into<String>, like: &Series, value: f64) -> Self {
        Self {
            label: label.into(),
            points: like.points.iter().map(|p| Point { t: p.t, v: Some(value) }).collect(),
        }
    }
}

/// Table payloads used by seasonality and volume-profile endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Table {
    Rows(Vec<serde_json::Value>),
    Value(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeMeta {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartMeta {
    pub bar_size: BarSize,
    pub use_rth: bool,
    pub range: RangeMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_offset_days: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The one response shape shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChartContract {
    pub label: String,
    pub expr: String,
    pub meta: ChartMeta,
    pub series: Vec<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<std::collections::HashMap<String, Table>>,
}

/// Discriminates what an expression/indicator evaluation produced, per the
/// "dynamic expression typing" design note. The serializer
/// projects this onto [`ChartContract`].
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub kind: ResultKind,
    pub label: String,
    pub series: Vec<Series>,
    pub tables: Option<std::collections::HashMap<String, Table>>,
    pub warning: Option<String>,
    /// `true` if any leaf resolved for this result went through
    /// ratio back-adjustment (a continuous-futures chain).
    pub back_adjusted: bool,
    /// `true` if any leaf resolved for this result came from a rolled
    /// (continuous or positional) futures chain.
    pub rolled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Chart,
    Indicator,
    Table,
}

impl EngineResult {
    pub fn into_contract(self, expr: String, meta: ChartMeta) -> ChartContract {
        let mut meta = meta;
        meta.warning = self.warning;
        if self.back_adjusted {
            meta.adjustment = Some("ratio");
        }
        if self.rolled {
            meta.roll_offset_days = Some(crate::instrument::ROLL_OFFSET_DAYS);
        }
        ChartContract {
            label: self.label,
            expr,
            meta,
            series: self.series,
            tables: self.tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn detects_unsorted_points() {
        let mut s = Series::new("x");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        s.points.push(Point { t: t0, v: Some(1.0) });
        s.points.push(Point { t: t1, v: Some(2.0) });
        assert!(!s.is_sorted_strict());
    }

    #[test]
    fn point_round_trips_through_json() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let p = Point { t, v: Some(1.5) };
        let json = serde_json::to_string(&p).unwrap();
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(p.t, back.t);
        assert_eq!(p.v, back.v);
    }
}

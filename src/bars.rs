//! Bars, bar sizes, and the duration/range grammar used across the HTTP
//! surface (`"5 D"`, `"1 day"`, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A single OHLCV observation. `t` identifies the bar's open, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub t: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Supported bar sizes, ordered coarsest-last-compared by [`BarSize::seconds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarSize {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    OneHour,
    OneDay,
}

impl BarSize {
    pub fn seconds(self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::OneHour => 3_600,
            Self::OneDay => 86_400,
        }
    }

    /// Trading seconds per session, used to annualize rolling Sharpe for
    /// intraday bar sizes.
    pub fn trading_seconds_per_day(self) -> f64 {
        6.5 * 3_600.0
    }

    /// The coarser of two bar sizes. Mixed bar sizes are not supported at
    /// evaluation time, so legs that
    /// differ must be coerced onto the coarsest requested size upstream of
    /// the evaluator.
    pub fn coarsest(self, other: Self) -> Self {
        if self.seconds() >= other.seconds() {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OneMinute => "1 min",
            Self::FiveMinutes => "5 mins",
            Self::FifteenMinutes => "15 mins",
            Self::OneHour => "1 hour",
            Self::OneDay => "1 day",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BarSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "1 min" | "1min" => Self::OneMinute,
            "5 mins" | "5min" => Self::FiveMinutes,
            "15 mins" | "15min" => Self::FifteenMinutes,
            "1 hour" | "1h" => Self::OneHour,
            "1 day" | "1d" => Self::OneDay,
            other => {
                return Err(Error::UnsupportedParameter(format!(
                    "unsupported bar_size {other}"
                )))
            }
        })
    }
}

/// A right-open half-interval `[start, end)`, always normalized to whole
/// bar boundaries by the caller before use as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Range {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> crate::error::Result<Self> {
        if start >= end {
            return Err(Error::EmptyRange);
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// `true` when `self` fully covers `other`.
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The union of two overlapping-or-adjacent ranges, or `None` if there
    /// is a genuine gap between them (more than one bar's worth).
    pub fn union_adjacent(&self, other: &Self, bar_size: BarSize) -> Option<Self> {
        let gap = ChronoDuration::seconds(bar_size.seconds());
        if self.end + gap < other.start || other.end + gap < self.start {
            return None;
        }
        Some(Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }
}

/// A `"<N> <U>"` duration token, U in {D,W,M,Y} (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationToken {
    pub count: i64,
    pub unit: DurationUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    BusinessDay,
    Week,
    Month,
    Year,
}

impl FromStr for DurationToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (count_str, unit_str) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::UnsupportedParameter(format!("malformed duration {s}")))?;
        let count: i64 = count_str
            .parse()
            .map_err(|_| Error::UnsupportedParameter(format!("malformed duration {s}")))?;
        let unit = match unit_str.trim().to_ascii_uppercase().as_str() {
            "D" => DurationUnit::BusinessDay,
            "W" => DurationUnit::Week,
            "M" => DurationUnit::Month,
            "Y" => DurationUnit::Year,
            other => {
                return Err(Error::UnsupportedParameter(format!(
                    "unknown duration unit {other}"
                )))
            }
        };
        Ok(Self { count, unit })
    }
}

impl DurationToken {
    /// Resolve to a concrete range ending "now" (`end`). `D` steps in
    /// business days (Mon-Fri approximation, holidays aside); the other
    /// units step in calendar time.
    pub fn resolve(self, end: DateTime<Utc>) -> crate::error::Result<Range> {
        let start = match self.unit {
            DurationUnit::BusinessDay => {
                let mut remaining = self.count;
                let mut cursor = end;
                while remaining > 0 {
                    cursor -= ChronoDuration::days(1);
                    use chrono::Datelike;
                    let weekday = cursor.weekday();
                    if weekday != chrono::Weekday::Sat && weekday != chrono::Weekday::Sun {
                        remaining -= 1;
                    }
                }
                cursor
            }
            DurationUnit::Week => end - ChronoDuration::weeks(self.count),
            DurationUnit::Month => end - ChronoDuration::days(self.count * 30),
            DurationUnit::Year => end - ChronoDuration::days(self.count * 365),
        };
        Range::new(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn coarsest_picks_larger_bucket() {
        assert_eq!(BarSize::OneDay.coarsest(BarSize::OneMinute), BarSize::OneDay);
    }

    #[test]
    fn range_rejects_empty() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Range::new(t, t).is_err());
    }

    #[test]
    fn union_adjacent_merges_contiguous_ranges() {
        let a = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let b = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let merged = a.union_adjacent(&b, BarSize::OneDay).unwrap();
        assert_eq!(merged.start, a.start);
        assert_eq!(merged.end, b.end);
    }

    #[test]
    fn union_adjacent_rejects_true_gap() {
        let a = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let b = Range::new(
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert!(a.union_adjacent(&b, BarSize::OneDay).is_none());
    }

    #[test]
    fn parses_duration_token() {
        let d: DurationToken = "5 D".parse().unwrap();
        assert_eq!(d.count, 5);
        assert_eq!(d.unit, DurationUnit::BusinessDay);
    }
}

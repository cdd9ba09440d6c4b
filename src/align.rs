//! Time alignment: RTH filtering and building a common timestamp grid
//! across legs under a fill policy.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::bars::Bar;
use crate::exchange::Exchange;

/// Default cap on consecutive missing bars a leg may forward-fill before a
/// timestamp becomes undefined for that leg.
pub const DEFAULT_MAX_FILL_GAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    Union,
    Intersection,
}

/// Filter `bars` down to the primary venue's regular trading hours. Venues
/// with no tabulated session pass every bar through unfiltered.
pub fn filter_rth(bars: &[Bar], exchange: Exchange) -> Vec<Bar> {
    let Some(session) = exchange.session() else {
        return bars.to_vec();
    };
    bars.iter()
        .filter(|b| {
            let local = b.t.with_timezone(&session.timezone);
            let t = local.time();
            t >= session.open && t < session.close
        })
        .copied()
        .collect()
}

/// One leg's bars, addressable by timestamp for the fill policy below.
pub struct Leg<'a> {
    pub bars: &'a [Bar],
}

impl<'a> Leg<'a> {
    /// Resolve this leg's close at `t` under the last-observation-carried-
    /// forward policy: `step` is the leg's own bar spacing, used to count
    /// how many consecutive bar-widths separate the carried-forward
    /// observation from `t`. If that count exceeds `max_gap`, the value at
    /// `t` is undefined. `bars` must be sorted ascending by
    /// timestamp.
    pub fn value_at(&self, t: DateTime<Utc>, step_secs: i64, max_gap: usize) -> Option<f64> {
        if let Ok(idx) = self.bars.binary_search_by_key(&t, |b| b.t) {
            return Some(self.bars[idx].close);
        }
        let idx = self.bars.partition_point(|b| b.t < t);
        if idx == 0 {
            return None;
        }
        let last = &self.bars[idx - 1];
        if step_secs <= 0 {
            return Some(last.close);
        }
        let elapsed = (t - last.t).num_seconds();
        let missed_bars = (elapsed / step_secs).saturating_sub(1).max(0) as usize;
        if missed_bars > max_gap {
            return None;
        }
        Some(last.close)
    }
}

/// Build the grid of timestamps for a set of legs under `mode`.
pub fn build_grid(leg_timestamps: &[Vec<DateTime<Utc>>], mode: GridMode) -> Vec<DateTime<Utc>> {
    match mode {
        GridMode::Union => {
            let mut set = BTreeSet::new();
            for ts in leg_timestamps {
                set.extend(ts.iter().copied());
            }
            set.into_iter().collect()
        }
        GridMode::Intersection => {
            let Some(first) = leg_timestamps.first() else {
                return Vec::new();
            };
            let mut set: BTreeSet<DateTime<Utc>> = first.iter().copied().collect();
            for ts in &leg_timestamps[1..] {
                let other: BTreeSet<_> = ts.iter().copied().collect();
                set = set.intersection(&other).copied().collect();
            }
            set.into_iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(t: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn union_grid_combines_all_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let grid = build_grid(&[vec![t0, t1], vec![t1, t2]], GridMode::Union);
        assert_eq!(grid, vec![t0, t1, t2]);
    }

    #[test]
    fn intersection_grid_keeps_common_timestamps_only() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let grid = build_grid(&[vec![t0, t1], vec![t1, t2]], GridMode::Intersection);
        assert_eq!(grid, vec![t1]);
    }

    #[test]
    fn leg_value_carries_forward_within_cap() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = vec![bar(t0, 10.0)];
        let leg = Leg { bars: &bars };
        assert_eq!(leg.value_at(t1, 86_400, 5), Some(10.0));
    }

    #[test]
    fn leg_value_undefined_past_cap() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let bars = vec![bar(t0, 10.0)];
        let leg = Leg { bars: &bars };
        assert_eq!(leg.value_at(t1, 86_400, 2), None);
    }

    #[test]
    fn leg_value_none_before_any_bar() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let t_before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = vec![bar(t0, 10.0)];
        let leg = Leg { bars: &bars };
        assert_eq!(leg.value_at(t_before, 86_400, 5), None);
    }
}

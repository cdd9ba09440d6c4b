//! Volume profile: allocate each bar's volume across price bins
//! proportional to the bar's [low, high] overlap with each bin, then find
//! the value area capturing a configured fraction of total volume around
//! the point of control (the highest-volume bin).

use crate::bars::Bar;

pub struct VolumeProfile {
    pub bin_centers: Vec<f64>,
    pub volumes: Vec<f64>,
    pub cumulative: Vec<f64>,
    pub value_area_low: f64,
    pub value_area_high: f64,
}

pub fn volume_profile(bars: &[Bar], bin_count: usize, value_area_fraction: f64) -> Option<VolumeProfile> {
    if bars.is_empty() || bin_count == 0 {
        return None;
    }
    let lo = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let hi = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return None;
    }
    let bin_width = (hi - lo) / bin_count as f64;
    let mut volumes = vec![0.0_f64; bin_count];

    for bar in bars {
        let bar_range = (bar.high - bar.low).max(f64::EPSILON);
        for (i, vol) in volumes.iter_mut().enumerate() {
            let bin_lo = lo + i as f64 * bin_width;
            let bin_hi = bin_lo + bin_width;
            let overlap_lo = bar.low.max(bin_lo);
            let overlap_hi = bar.high.min(bin_hi);
            let overlap = (overlap_hi - overlap_lo).max(0.0);
            if overlap > 0.0 {
                *vol += bar.volume * (overlap / bar_range);
            }
        }
    }

    let bin_centers: Vec<f64> = (0..bin_count).map(|i| lo + (i as f64 + 0.5) * bin_width).collect();
    let total: f64 = volumes.iter().sum();
    let mut cumulative = Vec::with_capacity(bin_count);
    let mut running = 0.0;
    for v in &volumes {
        running += v;
        cumulative.push(if total > 0.0 { running / total } else { 0.0 });
    }

    let (value_area_low, value_area_high) = value_area(&volumes, bin_width, lo, value_area_fraction);

    Some(VolumeProfile { bin_centers, volumes, cumulative, value_area_low, value_area_high })
}

fn value_area(volumes: &[f64], bin_width: f64, lo: f64, fraction: f64) -> (f64, f64) {
    let total: f64 = volumes.iter().sum();
    if total <= 0.0 {
        return (lo, lo + bin_width * volumes.len() as f64);
    }
    let poc = volumes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut included = std::collections::HashSet::new();
    included.insert(poc);
    let mut acc = volumes[poc];
    let (mut lo_i, mut hi_i) = (poc, poc);

    while acc / total < fraction && (lo_i > 0 || hi_i + 1 < volumes.len()) {
        let below = if lo_i > 0 { Some(volumes[lo_i - 1]) } else { None };
        let above = if hi_i + 1 < volumes.len() { Some(volumes[hi_i + 1]) } else { None };
        match (below, above) {
            (Some(b), Some(a)) if b >= a => {
                lo_i -= 1;
                acc += b;
                included.insert(lo_i);
            }
            (Some(_), Some(a)) => {
                hi_i += 1;
                acc += a;
                included.insert(hi_i);
            }
            (Some(b), None) => {
                lo_i -= 1;
                acc += b;
                included.insert(lo_i);
            }
            (None, Some(a)) => {
                hi_i += 1;
                acc += a;
                included.insert(hi_i);
            }
            (None, None) => break,
        }
    }

    (lo + lo_i as f64 * bin_width, lo + (hi_i + 1) as f64 * bin_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(low: f64, high: f64, volume: f64) -> Bar {
        Bar {
            t: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open: (low + high) / 2.0,
            high,
            low,
            close: (low + high) / 2.0,
            volume,
        }
    }

    #[test]
    fn total_binned_volume_matches_input() {
        let bars = vec![bar(100.0, 102.0, 1000.0), bar(101.0, 103.0, 2000.0)];
        let profile = volume_profile(&bars, 10, 0.7).unwrap();
        let total: f64 = profile.volumes.iter().sum();
        assert!((total - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn value_area_brackets_point_of_control() {
        let bars = vec![bar(100.0, 101.0, 5000.0), bar(110.0, 111.0, 10.0)];
        let profile = volume_profile(&bars, 20, 0.7).unwrap();
        assert!(profile.value_area_low <= 101.0);
        assert!(profile.value_area_high >= 100.0);
    }

    #[test]
    fn empty_bars_returns_none() {
        assert!(volume_profile(&[], 10, 0.7).is_none());
    }
}

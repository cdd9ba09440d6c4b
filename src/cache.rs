//! The bar cache: keyed by (contract, bar size, RTH flag, normalized
//! range), LRU-evicted by total bar count, TTL-refreshed, stale-on-failure.

use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

use tokio::sync::Mutex;

use crate::bars::{Bar, BarSize, Range};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub contract_id: String,
    pub bar_size: BarSize,
    pub rth: bool,
}

struct Entry {
    range: Range,
    bars: Vec<Bar>,
    fetched_at: Instant,
    last_touched: u64,
}

pub struct BarCache {
    max_bars: usize,
    ttl: StdDuration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    clock: std::sync::atomic::AtomicU64,
}

impl BarCache {
    pub fn new(max_bars: usize, ttl: StdDuration) -> Self {
        Self {
            max_bars,
            ttl,
            entries: Mutex::new(HashMap::new()),
            clock: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Return bars covering `range`, composing cached partial ranges with a
    /// fetch of the missing sub-range(s) via `fetch`. On upstream failure
    /// while a stale entry is present, the stale entry is returned instead
    /// of propagating the error.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, range: Range, fetch: F) -> Result<Vec<Bar>>
    where
        F: Fn(Range) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<Bar>>>,
    {
        let touch = self.tick();
        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(&key) {
                if entry.range.covers(&range) && entry.fetched_at.elapsed() < self.ttl {
                    entry.last_touched = touch;
                    return Ok(slice(&entry.bars, &range));
                }
            }
        }

        // Missing or stale: fetch fresh bars for the requested range and
        // splice with whatever was cached, if anything.
        let fetch_result = fetch(range).await;

        let mut entries = self.entries.lock().await;
        match fetch_result {
            Ok(fresh) => {
                let spliced = match entries.remove(&key) {
                    Some(existing) if existing.range.intersects(&range) || adjacent(&existing.range, &range, key.bar_size) => {
                        splice(&existing.bars, &fresh, existing.range, range)
                    }
                    _ => fresh,
                };
                let union_range = Range {
                    start: range.start,
                    end: range.end,
                };
                entries.insert(
                    key,
                    Entry {
                        range: union_range,
                        bars: spliced.clone(),
                        fetched_at: Instant::now(),
                        last_touched: touch,
                    },
                );
                self.evict_if_needed(&mut entries);
                Ok(slice(&spliced, &range))
            }
            Err(e) => {
                if let Some(existing) = entries.get(&key) {
                    tracing::warn!(error = %e, "upstream fetch failed, serving stale cache entry");
                    return Ok(slice(&existing.bars, &range));
                }
                Err(e)
            }
        }
    }

    fn evict_if_needed(&self, entries: &mut HashMap<CacheKey, Entry>) {
        let total: usize = entries.values().map(|e| e.bars.len()).sum();
        if total <= self.max_bars {
            return;
        }
        let mut by_age: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), v.last_touched)).collect();
        by_age.sort_by_key(|(_, touched)| *touched);
        let mut remaining = total;
        for (key, _) in by_age {
            if remaining <= self.max_bars {
                break;
            }
            if let Some(e) = entries.remove(&key) {
                remaining -= e.bars.len();
            }
        }
    }
}

fn slice(bars: &[Bar], range: &Range) -> Vec<Bar> {
    bars.iter().filter(|b| range.contains(b.t)).copied().collect()
}

fn adjacent(a: &Range, b: &Range, bar_size: BarSize) -> bool {
    a.union_adjacent(b, bar_size).is_some()
}

/// Merge two bar vectors covering `a_range` and `b_range` respectively,
/// requiring timestamp continuity at the seam (no overlap duplication, no
/// gap longer than one bar).
fn splice(a: &[Bar], b: &[Bar], a_range: Range, b_range: Range) -> Vec<Bar> {
    let mut merged: HashMap<i64, Bar> = HashMap::new();
    for bar in a.iter().filter(|bar| a_range.contains(bar.t)) {
        merged.insert(bar.t.timestamp(), *bar);
    }
    for bar in b.iter().filter(|bar| b_range.contains(bar.t)) {
        merged.insert(bar.t.timestamp(), *bar);
    }
    let mut out: Vec<Bar> = merged.into_values().collect();
    out.sort_by_key(|b| b.t);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::Bar;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bar(t: chrono::DateTime<Utc>, close: f64) -> Bar {
        Bar {
            t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn key() -> CacheKey {
        CacheKey {
            contract_id: "AAPL".into(),
            bar_size: BarSize::OneDay,
            rth: true,
        }
    }

    #[tokio::test]
    async fn caches_full_coverage_without_refetch() {
        let cache = BarCache::new(10_000, StdDuration::from_secs(3600));
        let calls = Arc::new(AtomicUsize::new(0));
        let range = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        )
        .unwrap();

        let fetch = |r: Range| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![bar(r.start, 1.0)])
            }
        };

        cache.get_or_fetch(key(), range, fetch).await.unwrap();
        cache.get_or_fetch(key(), range, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_stale_entry_on_upstream_failure() {
        let cache = BarCache::new(10_000, StdDuration::from_millis(1));
        let range = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        )
        .unwrap();

        cache
            .get_or_fetch(key(), range, |r: Range| async move { Ok(vec![bar(r.start, 1.0)]) })
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(5)).await;

        let result = cache
            .get_or_fetch(key(), range, |_: Range| async move {
                Err(crate::error::Error::UpstreamUnavailable("down".into()))
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
    }
}

//! The behavioral contract of the upstream broker/market-data session.
//!
//! The upstream's wire protocol is assumed and out of scope; this trait
//! *is* its behavioral contract. [`coordinator::session::WireSession`] is
//! the production implementation; [`FakeUpstream`] is the deterministic
//! stand-in used by every test in this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::bars::{Bar, BarSize, Range};
use crate::error::{Error, Result};

/// A single explicit-contract record as enumerated by the upstream for a
/// futures root: its listing date and last trading day. Persisted to disk
/// by [`crate::calendar::ExpiryCalendar`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContractRecord {
    pub code: String,
    pub listing_date: DateTime<Utc>,
    pub last_trading_day: DateTime<Utc>,
}

/// The operations the coordinator drives. Implementors own exactly one
/// logical connection; the coordinator is responsible for pacing,
/// deduplication, caching, and retries around calls into this trait.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch raw bars for a concrete contract id over `range`. Bars are
    /// never partially filled by the upstream: either the full requested
    /// range (subject to market availability) comes back, or an error.
    async fn fetch_bars(
        &self,
        contract_id: &str,
        bar_size: BarSize,
        range: Range,
        rth: bool,
    ) -> Result<Vec<Bar>>;

    /// Enumerate live and near-past contracts for a futures root, used to
    /// build the roll calendar. Fails with [`Error::UnknownRoot`] if the
    /// root is not recognized.
    async fn enumerate_contracts(&self, root: &str) -> Result<Vec<ContractRecord>>;
}

/// Deterministic fake upstream used throughout the test suite. Generates a
/// synthetic random-walk price series seeded from the contract id so the
/// same (contract, range) always yields the same bars, which lets
/// idempotence/round-trip tests assert byte-equivalent output.
#[derive(Debug, Default)]
pub struct FakeUpstream {
    /// Roots this fake upstream recognizes, with a synthetic chain of
    /// quarterly contracts. Populated by [`FakeUpstream::with_root`].
    roots: Mutex<HashMap<String, Vec<ContractRecord>>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a futures root with a synthetic quarterly chain starting at
    /// `first_listing` and running for `count` contracts, each trading for
    /// `lifetime_days` days after an `overlap_days`-long dual-listing period.
    pub fn with_root(
        self,
        root: &str,
        first_listing: DateTime<Utc>,
        count: u32,
        lifetime_days: i64,
        overlap_days: i64,
    ) -> Self {
        let quarters = ["H", "M", "U", "Z"];
        let mut records = Vec::new();
        let mut listing = first_listing;
        for i in 0..count {
            let letter = quarters[(i as usize) % quarters.len()];
            let year = (listing.format("%y").to_string()).parse::<u32>().unwrap_or(0);
            let code = format!("{root}{letter}{year:02}");
            let last_trading_day = listing + Duration::days(lifetime_days);
            records.push(ContractRecord {
                code,
                listing_date: listing,
                last_trading_day,
            });
            listing += Duration::days(lifetime_days - overlap_days);
        }
        self.roots
            .lock()
            .expect("fake upstream mutex poisoned")
            .insert(root.to_owned(), records);
        self
    }

    fn seeded_bars(seed: &str, bar_size: BarSize, range: Range) -> Vec<Bar> {
        let mut hash: u64 = 1469598103934665603;
        for b in seed.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        let mut price = 100.0 + (hash % 400) as f64;
        let step = Duration::seconds(bar_size.seconds());
        let mut t = range.start;
        let mut bars = Vec::new();
        while t < range.end {
            // Skip weekends for daily+ bars so outputs look like trading
            // sessions.
            use chrono::Datelike;
            let is_weekend = t.weekday() == chrono::Weekday::Sat || t.weekday() == chrono::Weekday::Sun;
            if bar_size.seconds() < BarSize::OneDay.seconds() || !is_weekend {
                hash = hash.wrapping_mul(6364136223846793005).wrapping_add(1);
                let drift = ((hash >> 33) as i64 % 200 - 100) as f64 / 1000.0;
                let open = price;
                price = (price + drift).max(1.0);
                let close = price;
                let high = open.max(close) + 0.05;
                let low = open.min(close) - 0.05;
                bars.push(Bar {
                    t,
                    open,
                    high,
                    low,
                    close,
                    volume: 1_000.0 + (hash % 5_000) as f64,
                });
            }
            t += step;
        }
        bars
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_bars(
        &self,
        contract_id: &str,
        bar_size: BarSize,
        range: Range,
        _rth: bool,
    ) -> Result<Vec<Bar>> {
        Ok(Self::seeded_bars(contract_id, bar_size, range))
    }

    async fn enumerate_contracts(&self, root: &str) -> Result<Vec<ContractRecord>> {
        self.roots
            .lock()
            .expect("fake upstream mutex poisoned")
            .get(root)
            .cloned()
            .ok_or_else(|| Error::UnknownRoot(root.to_owned()))
    }
}

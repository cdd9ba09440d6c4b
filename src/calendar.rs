//! The expiry/roll calendar: per-root contract listing and last-trading-day
//! records, refreshed from the upstream on a TTL and persisted to disk.
//!
//! Split between an in-memory authoritative state and a small on-disk
//! record: a cache file per root holding the last refresh and the chain of
//! contract records, read at startup and rewritten after every refresh.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::upstream::{ContractRecord, Upstream};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedRoot {
    root: String,
    refreshed_at: DateTime<Utc>,
    contracts: Vec<PersistedContract>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedContract {
    code: String,
    listing_date: DateTime<Utc>,
    last_trading_day: DateTime<Utc>,
}

impl From<&ContractRecord> for PersistedContract {
    fn from(c: &ContractRecord) -> Self {
        Self {
            code: c.code.clone(),
            listing_date: c.listing_date,
            last_trading_day: c.last_trading_day,
        }
    }
}

impl From<PersistedContract> for ContractRecord {
    fn from(c: PersistedContract) -> Self {
        Self {
            code: c.code,
            listing_date: c.listing_date,
            last_trading_day: c.last_trading_day,
        }
    }
}

struct CachedRoot {
    fetched_at: Instant,
    records: Vec<ContractRecord>,
}

/// Per-root expiry calendar cache. A [`tokio::sync::Mutex`] per root
/// guarantees only one refresh occurs at a time for a given root, without
/// serializing refreshes of *different* roots.
pub struct ExpiryCalendar {
    upstream: Arc<dyn Upstream>,
    ttl: StdDuration,
    disk_dir: Option<PathBuf>,
    roots: RwLock<HashMap<String, Arc<Mutex<Option<CachedRoot>>>>>,
}

impl ExpiryCalendar {
    pub fn new(upstream: Arc<dyn Upstream>, ttl: StdDuration, disk_dir: Option<PathBuf>) -> Self {
        Self {
            upstream,
            ttl,
            disk_dir,
            roots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot_for(&self, root: &str) -> Arc<Mutex<Option<CachedRoot>>> {
        if let Some(slot) = self.roots.read().await.get(root) {
            return slot.clone();
        }
        let mut write = self.roots.write().await;
        write
            .entry(root.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn disk_path(&self, root: &str) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(format!("{root}.json")))
    }

    fn load_from_disk(&self, root: &str) -> Option<Vec<ContractRecord>> {
        let path = self.disk_path(root)?;
        let raw = std::fs::read_to_string(path).ok()?;
        let persisted: PersistedRoot = serde_json::from_str(&raw).ok()?;
        Some(persisted.contracts.into_iter().map(Into::into).collect())
    }

    fn save_to_disk(&self, root: &str, records: &[ContractRecord]) {
        let Some(path) = self.disk_path(root) else {
            return;
        };
        let persisted = PersistedRoot {
            root: root.to_owned(),
            refreshed_at: Utc::now(),
            contracts: records.iter().map(Into::into).collect(),
        };
        if let Ok(json) = serde_json::to_string_pretty(&persisted) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = std::fs::write(path, json);
        }
    }

    /// Return the chain for `root`, refreshing from the upstream if the
    /// cached entry is missing or past TTL. On upstream failure, stale
    /// entries are still returned rather than propagating the error.
    pub async fn chain_for(&self, root: &str) -> Result<Vec<ContractRecord>> {
        let slot = self.slot_for(root).await;
        let mut guard = slot.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.records.clone());
            }
        }

        match self.upstream.enumerate_contracts(root).await {
            Ok(records) => {
                self.save_to_disk(root, &records);
                *guard = Some(CachedRoot {
                    fetched_at: Instant::now(),
                    records: records.clone(),
                });
                Ok(records)
            }
            Err(e) => {
                if let Some(cached) = guard.as_ref() {
                    tracing::warn!(root, error = %e, "upstream unavailable, serving stale calendar");
                    return Ok(cached.records.clone());
                }
                if let Some(records) = self.load_from_disk(root) {
                    tracing::warn!(root, error = %e, "upstream unavailable, serving disk-cached calendar");
                    *guard = Some(CachedRoot {
                        fetched_at: Instant::now(),
                        records: records.clone(),
                    });
                    return Ok(records);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::upstream::FakeUpstream;
    use chrono::TimeZone;

    fn upstream() -> Arc<dyn Upstream> {
        Arc::new(FakeUpstream::new().with_root(
            "ES",
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            4,
            90,
            10,
        ))
    }

    #[tokio::test]
    async fn caches_chain_within_ttl() {
        let cal = ExpiryCalendar::new(upstream(), StdDuration::from_secs(3600), None);
        let first = cal.chain_for("ES").await.unwrap();
        let second = cal.chain_for("ES").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[tokio::test]
    async fn unknown_root_errors() {
        let cal = ExpiryCalendar::new(upstream(), StdDuration::from_secs(3600), None);
        assert!(matches!(
            cal.chain_for("ZZ").await.unwrap_err(),
            Error::UnknownRoot(_)
        ));
    }
}

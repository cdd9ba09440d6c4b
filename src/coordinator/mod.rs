//! The session and request coordinator: multiplexes many concurrent fetch
//! intents onto one upstream session, enforcing pacing, bounded
//! concurrency, in-flight dedup, and bounded retries.

mod dedup;
mod limiter;
pub mod session;
mod wire;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::bars::{Bar, BarSize, Range};
use crate::config::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::upstream::{ContractRecord, Upstream};
use dedup::SingleFlight;
use limiter::RateLimiter;
pub use session::WireSession;

/// The lifecycle of one in-flight coordinator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Inflight,
    Done,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    contract_id: String,
    bar_size: BarSize,
    rth: bool,
    start_ms: i64,
    end_ms: i64,
}

impl FetchKey {
    fn new(contract_id: &str, bar_size: BarSize, range: Range, rth: bool) -> Self {
        Self {
            contract_id: contract_id.to_owned(),
            bar_size,
            rth,
            start_ms: range.start.timestamp_millis(),
            end_ms: range.end.timestamp_millis(),
        }
    }
}

pub struct Coordinator {
    upstream: Arc<dyn Upstream>,
    limiter: RateLimiter,
    slots: Arc<Semaphore>,
    dedup: Arc<SingleFlight<FetchKey, Result<Vec<Bar>>>>,
    max_retries: u32,
    queue_dwell: Duration,
}

impl Coordinator {
    /// Build a coordinator around an already-constructed upstream, e.g. a
    /// [`crate::upstream::FakeUpstream`] in tests.
    pub fn with_upstream(upstream: Arc<dyn Upstream>, config: &CoordinatorConfig) -> Self {
        Self {
            upstream,
            limiter: RateLimiter::new(config.rate_limit_per_sec),
            slots: Arc::new(Semaphore::new(config.slots)),
            dedup: Arc::new(SingleFlight::new()),
            max_retries: config.max_retries,
            queue_dwell: Duration::from_secs(config.queue_dwell_secs),
        }
    }

    /// Connect a real [`WireSession`] and wrap it as the coordinator's
    /// upstream.
    pub async fn connect(host: Ipv4Addr, port: u16, config: &CoordinatorConfig) -> Result<Self> {
        let session = WireSession::connect(host, port).await?;
        Ok(Self::with_upstream(Arc::new(session), config))
    }

    /// Drain in-flight work and tear down the connection. A no-op for
    /// upstreams that don't own a real connection (e.g. the fake used in
    /// tests), since [`Upstream`] itself has no shutdown hook — only
    /// [`WireSession`] does.
    pub async fn shutdown(self) {
        // The `Arc<dyn Upstream>` erases the concrete type, so shutdown of
        // a `WireSession` is driven by dropping the last reference; callers
        // that need a graceful drain should hold their own `Arc<WireSession>`
        // and call `WireSession::shutdown` before dropping the coordinator.
        drop(self);
    }

    /// Fetch bars for one contract, honoring the deadline, rate limit,
    /// in-flight dedup, and retry policy.
    pub async fn fetch_bars(
        &self,
        contract_id: &str,
        bar_size: BarSize,
        range: Range,
        rth: bool,
        deadline: Duration,
    ) -> Result<Vec<Bar>> {
        let key = FetchKey::new(contract_id, bar_size, range, rth);
        let upstream = self.upstream.clone();
        let limiter = self.limiter.clone();
        let slots = self.slots.clone();
        let max_retries = self.max_retries;
        let contract_id = contract_id.to_owned();

        let queued_at = tokio::time::Instant::now();
        let queue_dwell = self.queue_dwell;

        let work = self.dedup.run(key, move || async move {
            if queued_at.elapsed() > queue_dwell {
                tracing::warn!(contract_id, "request exceeded queue dwell timeout");
                return Err(Error::Timeout);
            }

            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|_| Error::Invariant("coordinator semaphore closed".into()))?;

            limiter.acquire().await;

            let mut attempt = 0_u32;
            loop {
                match upstream.fetch_bars(&contract_id, bar_size, range, rth).await {
                    Ok(bars) => return Ok(bars),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        attempt += 1;
                        let backoff = Duration::from_millis(100 * 2_u64.pow(attempt.min(6)));
                        tracing::debug!(contract_id, attempt, error = %e, "retrying after transient upstream error");
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        });

        tokio::time::timeout(deadline, work)
            .await
            .unwrap_or(Err(Error::Timeout))
    }

    pub async fn enumerate_contracts(&self, root: &str) -> Result<Vec<ContractRecord>> {
        self.upstream.enumerate_contracts(root).await
    }

    /// Exposed for [`crate::calendar::ExpiryCalendar`], which needs its own
    /// handle on the upstream rather than going back through the
    /// coordinator's pacing (the calendar is refreshed rarely and already
    /// single-flighted per-root).
    pub fn upstream(&self) -> Arc<dyn Upstream> {
        self.upstream.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FakeUpstream;
    use chrono::{TimeZone, Utc};

    fn coordinator() -> Coordinator {
        Coordinator::with_upstream(Arc::new(FakeUpstream::new()), &CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn fetches_bars_from_fake_upstream() {
        let coord = coordinator();
        let range = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let bars = coord
            .fetch_bars("AAPL", BarSize::OneDay, range, true, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!bars.is_empty());
        for pair in bars.windows(2) {
            assert!(pair[0].t < pair[1].t);
        }
    }

    #[tokio::test]
    async fn concurrent_slot_count_is_bounded() {
        let mut config = CoordinatorConfig::default();
        config.slots = 2;
        let coord = Arc::new(Coordinator::with_upstream(Arc::new(FakeUpstream::new()), &config));
        let range = Range::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .unwrap();

        let mut handles = Vec::new();
        for i in 0..6 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord
                    .fetch_bars(&format!("C{i}"), BarSize::OneDay, range, true, Duration::from_secs(5))
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
    }
}

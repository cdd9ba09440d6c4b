//! The process-level value: one `Engine` owns the coordinator, bar cache,
//! and expiry calendar, with explicit `start`/`shutdown`
//! lifecycle methods, constructed once in `src/bin/server.rs` and handed to
//! the HTTP router as `axum::State`.

use std::sync::Arc;

use crate::bars::Range;
use crate::cache::{BarCache, CacheKey};
use crate::calendar::ExpiryCalendar;
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::exchange::Exchange;
use crate::instrument::{Instrument, ResolvedChain};
use crate::symbol::Symbol;
use crate::upstream::FakeUpstream;

use crate::bars::{Bar, BarSize};

#[derive(Clone)]
pub struct Engine {
    pub coordinator: Arc<Coordinator>,
    pub bar_cache: Arc<BarCache>,
    pub calendar: Arc<ExpiryCalendar>,
    pub config: Config,
}

impl Engine {
    /// Connect the coordinator and build the supporting caches. The calendar
    /// shares the coordinator's upstream handle rather than opening a
    /// second connection.
    pub async fn start(config: Config) -> Result<Self> {
        let coordinator = Coordinator::connect(
            config.upstream.host,
            config.upstream.port,
            &config.coordinator,
        )
        .await?;
        let upstream = coordinator.upstream();
        let calendar = ExpiryCalendar::new(
            upstream,
            std::time::Duration::from_secs(config.cache.calendar_ttl_secs),
            None,
        );
        let bar_cache = BarCache::new(
            config.cache.max_bars,
            std::time::Duration::from_secs(config.cache.bar_ttl_secs),
        );
        Ok(Self {
            coordinator: Arc::new(coordinator),
            bar_cache: Arc::new(bar_cache),
            calendar: Arc::new(calendar),
            config,
        })
    }

    /// Build an engine around a [`FakeUpstream`] for tests and the `/pack`
    /// and expression-engine examples in this crate's own test suite.
    pub fn with_fake_upstream(upstream: FakeUpstream) -> Self {
        let upstream: Arc<dyn crate::upstream::Upstream> = Arc::new(upstream);
        let coordinator =
            Coordinator::with_upstream(upstream.clone(), &crate::config::CoordinatorConfig::default());
        let calendar = ExpiryCalendar::new(upstream, std::time::Duration::from_secs(3600), None);
        let bar_cache = BarCache::new(1_000_000, std::time::Duration::from_secs(3600));
        Self {
            coordinator: Arc::new(coordinator),
            bar_cache: Arc::new(bar_cache),
            calendar: Arc::new(calendar),
            config: Config {
                upstream: crate::config::UpstreamConfig {
                    host: std::net::Ipv4Addr::LOCALHOST,
                    port: 1,
                    client_id: 0,
                    username: None,
                    password: None,
                },
                coordinator: crate::config::CoordinatorConfig::default(),
                cache: crate::config::CacheConfig::default(),
                http: crate::config::HttpConfig::default(),
            },
        }
    }

    pub async fn shutdown(self) {
        if let Ok(coordinator) = Arc::try_unwrap(self.coordinator) {
            coordinator.shutdown().await;
        }
    }

    /// Resolve one leaf symbol and fetch its bars, applying RTH filtering
    /// per segment and ratio back-adjustment across roll seams for
    /// continuous futures.
    pub async fn fetch_leaf(
        &self,
        symbol: &Symbol,
        range: Range,
        bar_size: BarSize,
        rth: bool,
    ) -> Result<(ResolvedChain, Vec<Bar>)> {
        let chain = crate::instrument::resolve(symbol, range, &self.calendar).await?;
        let mut segment_bars = Vec::with_capacity(chain.segments.len());
        for segment in &chain.segments {
            let bars = self.fetch_segment(&segment.contract, segment.validity, bar_size, rth).await?;
            segment_bars.push(bars);
        }
        if chain.back_adjust {
            back_adjust(&mut segment_bars);
        }
        let mut bars: Vec<Bar> = segment_bars.into_iter().flatten().collect();
        bars.sort_by_key(|b| b.t);
        Ok((chain, bars))
    }

    async fn fetch_segment(
        &self,
        instrument: &Instrument,
        range: Range,
        bar_size: BarSize,
        rth: bool,
    ) -> Result<Vec<Bar>> {
        let key = CacheKey {
            contract_id: instrument.contract_id.clone(),
            bar_size,
            rth,
        };
        let coordinator = self.coordinator.clone();
        let contract_id = instrument.contract_id.clone();
        let timeout = std::time::Duration::from_secs(self.config.coordinator.request_timeout_secs);
        let bars = self
            .bar_cache
            .get_or_fetch(key, range, move |r| {
                let coordinator = coordinator.clone();
                let contract_id = contract_id.clone();
                async move { coordinator.fetch_bars(&contract_id, bar_size, r, rth, timeout).await }
            })
            .await?;
        let exchange = instrument.exchange;
        Ok(if rth { filter_for_exchange(&bars, exchange) } else { bars })
    }
}

fn filter_for_exchange(bars: &[Bar], exchange: Exchange) -> Vec<Bar> {
    crate::align::filter_rth(bars, exchange)
}

/// Ratio-adjust every segment but the last so each seam is continuous: the
/// last bar of an earlier segment is scaled to match the (already-scaled)
/// first bar of the segment that follows it, with the adjustment
/// propagating backwards from the most recent contract.
fn back_adjust(segments: &mut [Vec<Bar>]) {
    if segments.len() < 2 {
        return;
    }
    for i in (0..segments.len() - 1).rev() {
        let anchor = segments[i + 1].first().map(|b| b.close);
        let seam = segments[i].last().map(|b| b.close);
        let (Some(anchor), Some(seam)) = (anchor, seam) else {
            continue;
        };
        if seam == 0.0 {
            continue;
        }
        let ratio = anchor / seam;
        for bar in &mut segments[i] {
            bar.open *= ratio;
            bar.high *= ratio;
            bar.low *= ratio;
            bar.close *= ratio;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn range(y0: i32, y1: i32) -> Range {
        Range::new(
            Utc.with_ymd_and_hms(y0, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(y1, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn continuous_future_is_continuous_at_seams() {
        let upstream = FakeUpstream::new().with_root("ES", Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(), 4, 95, 10);
        let engine = Engine::with_fake_upstream(upstream);
        let symbol: Symbol = "IX:ES.A".parse().unwrap();
        let (chain, bars) = engine
            .fetch_leaf(&symbol, range(2023, 2024), BarSize::OneDay, false)
            .await
            .unwrap();
        assert!(chain.back_adjust);
        assert!(!bars.is_empty());
        for pair in bars.windows(2) {
            assert!(pair[0].t < pair[1].t);
        }
    }

    #[tokio::test]
    async fn equity_leaf_fetches_bars() {
        let engine = Engine::with_fake_upstream(FakeUpstream::new());
        let symbol: Symbol = "EQ:AAPL".parse().unwrap();
        let (chain, bars) = engine
            .fetch_leaf(&symbol, range(2024, 2025), BarSize::OneDay, false)
            .await
            .unwrap();
        assert_eq!(chain.segments.len(), 1);
        assert!(!bars.is_empty());
    }
}

//! The symbol resolver: turns a parsed [`Symbol`] into an ordered chain of
//! concrete (contract, validity) segments.

use chrono::Duration;

use crate::bars::Range;
use crate::calendar::ExpiryCalendar;
use crate::currency::Currency;
use crate::error::{Error, Result};
use crate::exchange::Exchange;
use crate::symbol::{FuturesSuffix, Namespace, Symbol};

/// The default roll rule: roll `ROLL_OFFSET_DAYS` before the active
/// contract's last trading day. The exact per-root offset is a documented
/// implementation choice; quantdesk uses one constant for all roots and
/// records it in `meta.roll_offset_days` on continuous/positional chart
/// responses (see [`ResolvedChain::rolled`]).
pub const ROLL_OFFSET_DAYS: i64 = 5;

/// A resolved, concrete contract plus the display metadata the serializer
/// and multi-currency conversion path need.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub contract_id: String,
    pub currency: Currency,
    pub exchange: Exchange,
    pub multiplier: f64,
}

/// One segment of a resolved chain: a concrete contract valid over
/// `[validity.start, validity.end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSegment {
    pub contract: Instrument,
    pub validity: Range,
}

/// The full resolved chain for one leaf symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    pub label: String,
    pub segments: Vec<ChainSegment>,
    /// `true` only for `.A` continuous futures: the bar combiner must
    /// ratio-adjust at each seam.
    pub back_adjust: bool,
    /// `true` for continuous and positional futures chains, whose segments
    /// were built by applying [`ROLL_OFFSET_DAYS`] against the expiry
    /// calendar. `false` for equities, FX, bare indices, and explicit
    /// contracts, which never roll.
    pub rolled: bool,
}

impl ResolvedChain {
    fn single(label: String, contract: Instrument, range: Range) -> Self {
        Self {
            label,
            segments: vec![ChainSegment {
                contract,
                validity: range,
            }],
            back_adjust: false,
            rolled: false,
        }
    }
}

/// Resolve a leaf symbol into its chain over `range`. Never talks to the
/// network for EQ/FX/bare-index symbols; futures chains consult
/// `calendar`.
pub async fn resolve(symbol: &Symbol, range: Range, calendar: &ExpiryCalendar) -> Result<ResolvedChain> {
    match symbol.namespace {
        Namespace::Equity => Ok(ResolvedChain::single(
            symbol.to_string(),
            Instrument {
                contract_id: symbol.root.clone(),
                currency: Exchange::Nasdaq.default_currency(),
                exchange: Exchange::Nasdaq,
                multiplier: 1.0,
            },
            range,
        )),
        Namespace::Fx => {
            let quote = &symbol.body[3..6];
            let currency = quote
                .parse::<Currency>()
                .unwrap_or(Currency::USDollar);
            Ok(ResolvedChain::single(
                symbol.to_string(),
                Instrument {
                    contract_id: symbol.body.clone(),
                    currency,
                    exchange: Exchange::Synthetic,
                    multiplier: 1.0,
                },
                range,
            ))
        }
        Namespace::Index => resolve_index(symbol, range, calendar).await,
    }
}

async fn resolve_index(symbol: &Symbol, range: Range, calendar: &ExpiryCalendar) -> Result<ResolvedChain> {
    let Some(suffix) = symbol.futures_suffix() else {
        // Bare cash index: single entry, no chain.
        return Ok(ResolvedChain::single(
            symbol.to_string(),
            Instrument {
                contract_id: symbol.root.clone(),
                currency: Currency::USDollar,
                exchange: Exchange::Synthetic,
                multiplier: 1.0,
            },
            range,
        ));
    };

    match suffix {
        FuturesSuffix::Explicit {
            month_letter,
            year_2digit,
        } => {
            let code = format!("{}{}{:02}", symbol.root, month_letter, year_2digit);
            Ok(ResolvedChain::single(
                symbol.to_string(),
                Instrument {
                    contract_id: code,
                    currency: Currency::USDollar,
                    exchange: Exchange::Cme,
                    multiplier: 1.0,
                },
                range,
            ))
        }
        FuturesSuffix::Continuous => build_chain(symbol, range, calendar, 0, true).await,
        FuturesSuffix::Positional(n) => build_chain(symbol, range, calendar, (n - 1) as usize, false).await,
    }
}

async fn build_chain(
    symbol: &Symbol,
    range: Range,
    calendar: &ExpiryCalendar,
    position_offset: usize,
    back_adjust: bool,
) -> Result<ResolvedChain> {
    let mut records = calendar.chain_for(&symbol.root).await?;
    records.sort_by_key(|r| r.last_trading_day);

    let roll_offset = Duration::days(ROLL_OFFSET_DAYS);
    // Roll boundaries: record[i] is "front" during [lower_bound(i), roll(i)).
    let roll_dates: Vec<_> = records.iter().map(|r| r.last_trading_day - roll_offset).collect();

    let mut segments = Vec::new();
    for i in 0..records.len() {
        let idx = i + position_offset;
        if idx >= records.len() {
            break;
        }
        let lower = if i == 0 {
            records[idx].listing_date
        } else {
            roll_dates[i - 1]
        };
        let upper = roll_dates[i];
        if upper <= lower {
            continue;
        }
        let Ok(segment_range) = Range::new(lower, upper) else {
            continue;
        };
        if !segment_range.intersects(&range) {
            continue;
        }
        let clipped_start = segment_range.start.max(range.start);
        let clipped_end = segment_range.end.min(range.end);
        let Ok(clipped) = Range::new(clipped_start, clipped_end) else {
            continue;
        };
        segments.push(ChainSegment {
            contract: Instrument {
                contract_id: records[idx].code.clone(),
                currency: Currency::USDollar,
                exchange: Exchange::Cme,
                multiplier: 1.0,
            },
            validity: clipped,
        });
    }

    if segments.is_empty() {
        return Err(Error::NoChainForRange(symbol.to_string()));
    }
    segments.sort_by_key(|s| s.validity.start);

    Ok(ResolvedChain {
        label: symbol.to_string(),
        segments,
        back_adjust,
        rolled: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FakeUpstream;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn calendar() -> ExpiryCalendar {
        let upstream = FakeUpstream::new().with_root(
            "ES",
            utc_ymd(2023, 1, 1),
            4,
            95,
            10,
        );
        ExpiryCalendar::new(Arc::new(upstream), StdDuration::from_secs(3600), None)
    }

    fn utc_ymd(y: i32, m: u32, d: u32) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn equity_resolves_to_single_segment() {
        let symbol: Symbol = "EQ:SPY".parse().unwrap();
        let range = Range::new(utc_ymd(2024, 1, 1), utc_ymd(2024, 2, 1)).unwrap();
        let chain = resolve(&symbol, range, &calendar()).await.unwrap();
        assert_eq!(chain.segments.len(), 1);
        assert!(!chain.back_adjust);
        assert!(!chain.rolled);
    }

    #[tokio::test]
    async fn continuous_future_partitions_without_gaps() {
        let symbol: Symbol = "IX:ES.A".parse().unwrap();
        let range = Range::new(utc_ymd(2023, 1, 1), utc_ymd(2023, 12, 1)).unwrap();
        let chain = resolve(&symbol, range, &calendar()).await.unwrap();
        assert!(chain.back_adjust);
        assert!(chain.rolled);
        assert!(chain.segments.len() >= 2);
        for pair in chain.segments.windows(2) {
            assert_eq!(pair[0].validity.end, pair[1].validity.start);
        }
    }

    #[tokio::test]
    async fn positional_future_has_no_back_adjustment() {
        let symbol: Symbol = "IX:ES2".parse().unwrap();
        let range = Range::new(utc_ymd(2023, 1, 1), utc_ymd(2023, 6, 1)).unwrap();
        let chain = resolve(&symbol, range, &calendar()).await.unwrap();
        assert!(!chain.back_adjust);
        assert!(chain.rolled);
    }

    #[tokio::test]
    async fn explicit_contract_resolves_directly() {
        let symbol: Symbol = "IX:ESU26".parse().unwrap();
        let range = Range::new(utc_ymd(2026, 1, 1), utc_ymd(2026, 6, 1)).unwrap();
        let chain = resolve(&symbol, range, &calendar()).await.unwrap();
        assert_eq!(chain.segments[0].contract.contract_id, "ESU26");
        assert!(!chain.rolled);
    }

    #[tokio::test]
    async fn unknown_root_propagates() {
        let symbol: Symbol = "IX:ZZ.A".parse().unwrap();
        let range = Range::new(utc_ymd(2024, 1, 1), utc_ymd(2024, 2, 1)).unwrap();
        assert!(matches!(
            resolve(&symbol, range, &calendar()).await.unwrap_err(),
            Error::UnknownRoot(_)
        ));
    }
}

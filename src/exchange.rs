//! Primary venues, scoped down to what the aligner needs: an IANA timezone
//! and a regular trading hours session.

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::currency::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Nasdaq,
    Nyse,
    Cme,
    Cboe,
    LondonStockExchange,
    DeutscheBorse,
    TokyoStockExchange,
    HongKongExchange,
    /// Used for synthetic/cash instruments with no real trading venue.
    Synthetic,
}

/// A venue's regular trading hours session, expressed in its own local time.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Exchange {
    pub fn session(self) -> Option<Session> {
        use chrono_tz::{Asia, Europe, America};
        let (tz, open, close) = match self {
            Self::Nasdaq | Self::Nyse | Self::Cme | Self::Cboe => (
                America::New_York,
                NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
                NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
            ),
            Self::LondonStockExchange => (
                Europe::London,
                NaiveTime::from_hms_opt(8, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(16, 30, 0).expect("valid time"),
            ),
            Self::DeutscheBorse => (
                Europe::Berlin,
                NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(17, 30, 0).expect("valid time"),
            ),
            Self::TokyoStockExchange => (
                Asia::Tokyo,
                NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(15, 0, 0).expect("valid time"),
            ),
            Self::HongKongExchange => (
                Asia::Hong_Kong,
                NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
                NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
            ),
            Self::Synthetic => return None,
        };
        Some(Session {
            timezone: tz,
            open,
            close,
        })
    }

    /// The currency instruments on this venue are quoted in, absent an
    /// override from the instrument itself.
    pub fn default_currency(self) -> Currency {
        match self {
            Self::Nasdaq | Self::Nyse | Self::Cme | Self::Cboe => Currency::USDollar,
            Self::LondonStockExchange => Currency::BritishPound,
            Self::DeutscheBorse => Currency::Euro,
            Self::TokyoStockExchange => Currency::JapaneseYen,
            Self::HongKongExchange => Currency::HongKongDollar,
            Self::Synthetic => Currency::USDollar,
        }
    }
}

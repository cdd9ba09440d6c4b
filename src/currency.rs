//! Trading currencies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    USDollar,
    Euro,
    BritishPound,
    JapaneseYen,
    CanadianDollar,
    AustralianDollar,
    SwissFranc,
    HongKongDollar,
}

impl Currency {
    pub const fn code(self) -> &'static str {
        match self {
            Self::USDollar => "USD",
            Self::Euro => "EUR",
            Self::BritishPound => "GBP",
            Self::JapaneseYen => "JPY",
            Self::CanadianDollar => "CAD",
            Self::AustralianDollar => "AUD",
            Self::SwissFranc => "CHF",
            Self::HongKongDollar => "HKD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "USD" => Self::USDollar,
            "EUR" => Self::Euro,
            "GBP" => Self::BritishPound,
            "JPY" => Self::JapaneseYen,
            "CAD" => Self::CanadianDollar,
            "AUD" => Self::AustralianDollar,
            "CHF" => Self::SwissFranc,
            "HKD" => Self::HongKongDollar,
            other => return Err(Error::MalformedToken(format!("unknown currency {other}"))),
        })
    }
}

/// The FX pair token (e.g. `EURUSD`) needed to convert `from` into `to`.
pub fn pair_token(from: Currency, to: Currency) -> String {
    format!("FX:{}{}", from.code(), to.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_currency_codes() {
        for c in [
            Currency::USDollar,
            Currency::Euro,
            Currency::BritishPound,
            Currency::JapaneseYen,
        ] {
            assert_eq!(c.code().parse::<Currency>().unwrap(), c);
        }
    }

    #[test]
    fn builds_pair_token() {
        assert_eq!(
            pair_token(Currency::Euro, Currency::USDollar),
            "FX:EURUSD"
        );
    }
}

//! Canonical symbol tokens (`EQ:SPY`, `IX:ES.A`, `IX:ES1`, `IX:ESU26`, ...).
//!
//! Parsing here is deliberately pure and synchronous: it never touches the
//! network. Turning a [`Symbol`] into upstream fetch requests is the
//! resolver's job (`crate::instrument`).

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The three supported namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// An equity on its primary or named venue.
    Equity,
    /// A six-letter currency pair.
    Fx,
    /// A cash index or futures root.
    Index,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equity => "EQ",
            Self::Fx => "FX",
            Self::Index => "IX",
        }
    }
}

/// The futures suffix on an `IX:` body, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FuturesSuffix {
    /// `.A` — continuous, back-adjusted.
    Continuous,
    /// `N` for N in 1..=9 — N-th from front at each historical date.
    Positional(u8),
    /// A six-character explicit contract code, e.g. `ESU26`.
    Explicit {
        month_letter: char,
        year_2digit: u8,
    },
}

/// A parsed, not-yet-resolved symbol token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub namespace: Namespace,
    pub body: String,
    pub root: String,
    pub suffix: Option<FuturesSuffixKey>,
}

/// Cheap, `Eq`-friendly stand-in for [`FuturesSuffix`] so [`Symbol`] can
/// derive `Hash`/`Eq` without `f64`/etc. creeping in later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuturesSuffixKey {
    Continuous,
    Positional(u8),
    Explicit { month_letter: char, year_2digit: u8 },
}

impl From<&FuturesSuffixKey> for FuturesSuffix {
    fn from(k: &FuturesSuffixKey) -> Self {
        match *k {
            FuturesSuffixKey::Continuous => Self::Continuous,
            FuturesSuffixKey::Positional(n) => Self::Positional(n),
            FuturesSuffixKey::Explicit {
                month_letter,
                year_2digit,
            } => Self::Explicit {
                month_letter,
                year_2digit,
            },
        }
    }
}

const MONTH_LETTERS: &str = "FGHJKMNQUVXZ";

impl Symbol {
    pub fn futures_suffix(&self) -> Option<FuturesSuffix> {
        self.suffix.as_ref().map(FuturesSuffix::from)
    }

    /// `true` for a bare cash index/equity/FX token with no futures chain.
    pub fn is_single_segment(&self) -> bool {
        self.suffix.is_none()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.as_str(), self.body)
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (ns, body) = token
            .split_once(':')
            .ok_or_else(|| Error::MalformedToken(token.to_owned()))?;
        if body.is_empty() {
            return Err(Error::MalformedToken(token.to_owned()));
        }
        let namespace = match ns {
            "EQ" => Namespace::Equity,
            "FX" => Namespace::Fx,
            "IX" => Namespace::Index,
            _ => return Err(Error::MalformedToken(token.to_owned())),
        };

        match namespace {
            Namespace::Equity => {
                // TICKER[.EXCHANGE] — ticker is alphanumeric, exchange is
                // an optional dot-suffixed alphabetic venue code.
                let root = body.split('.').next().unwrap_or(body);
                if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(Error::MalformedToken(token.to_owned()));
                }
                Ok(Self {
                    namespace,
                    body: body.to_owned(),
                    root: root.to_owned(),
                    suffix: None,
                })
            }
            Namespace::Fx => {
                if body.len() != 6 || !body.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(Error::MalformedToken(token.to_owned()));
                }
                Ok(Self {
                    namespace,
                    body: body.to_owned(),
                    root: body.to_owned(),
                    suffix: None,
                })
            }
            Namespace::Index => parse_index_body(token, body),
        }
    }
}

fn parse_index_body(token: &str, body: &str) -> Result<Symbol, Error> {
    if let Some(root) = body.strip_suffix(".A") {
        if root.is_empty() {
            return Err(Error::MalformedToken(token.to_owned()));
        }
        return Ok(Symbol {
            namespace: Namespace::Index,
            body: body.to_owned(),
            root: root.to_owned(),
            suffix: Some(FuturesSuffixKey::Continuous),
        });
    }

    // Positional: ROOT + single digit 1..=9, only when the remaining root is
    // nonempty (so a bare numeric-looking index name isn't misparsed).
    if let Some(last) = body.chars().last() {
        if last.is_ascii_digit() && last != '0' {
            let root = &body[..body.len() - 1];
            if !root.is_empty() {
                let n = last.to_digit(10).expect("checked ascii digit") as u8;
                return Ok(Symbol {
                    namespace: Namespace::Index,
                    body: body.to_owned(),
                    root: root.to_owned(),
                    suffix: Some(FuturesSuffixKey::Positional(n)),
                });
            }
        }
    }

    // Explicit contract: ROOT (>=1 char) + one month letter + two digit year.
    if body.len() >= 4 {
        let (root_and_letter, year) = body.split_at(body.len() - 2);
        if year.chars().all(|c| c.is_ascii_digit()) {
            if let Some(month_letter) = root_and_letter.chars().last() {
                if MONTH_LETTERS.contains(month_letter) {
                    let root = &root_and_letter[..root_and_letter.len() - 1];
                    if !root.is_empty() {
                        return Ok(Symbol {
                            namespace: Namespace::Index,
                            body: body.to_owned(),
                            root: root.to_owned(),
                            suffix: Some(FuturesSuffixKey::Explicit {
                                month_letter,
                                year_2digit: year.parse().expect("checked ascii digits"),
                            }),
                        });
                    }
                }
            }
        }
    }

    // Bare cash index.
    if !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::MalformedToken(token.to_owned()));
    }
    Ok(Symbol {
        namespace: Namespace::Index,
        body: body.to_owned(),
        root: body.to_owned(),
        suffix: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_equity() {
        let s: Symbol = "EQ:AAPL".parse().unwrap();
        assert_eq!(s.namespace, Namespace::Equity);
        assert_eq!(s.root, "AAPL");
        assert!(s.is_single_segment());
    }

    #[test]
    fn parses_equity_with_exchange() {
        let s: Symbol = "EQ:VOD.L".parse().unwrap();
        assert_eq!(s.root, "VOD");
    }

    #[test]
    fn parses_fx_pair() {
        let s: Symbol = "FX:EURUSD".parse().unwrap();
        assert_eq!(s.namespace, Namespace::Fx);
    }

    #[test]
    fn rejects_bad_fx_length() {
        assert!("FX:EURUS".parse::<Symbol>().is_err());
    }

    #[test]
    fn parses_continuous_future() {
        let s: Symbol = "IX:ES.A".parse().unwrap();
        assert_eq!(s.root, "ES");
        assert_eq!(s.futures_suffix(), Some(FuturesSuffix::Continuous));
    }

    #[test]
    fn parses_positional_future() {
        let s: Symbol = "IX:ES1".parse().unwrap();
        assert_eq!(s.root, "ES");
        assert_eq!(s.futures_suffix(), Some(FuturesSuffix::Positional(1)));
    }

    #[test]
    fn parses_explicit_contract() {
        let s: Symbol = "IX:ESU26".parse().unwrap();
        assert_eq!(s.root, "ES");
        assert_eq!(
            s.futures_suffix(),
            Some(FuturesSuffix::Explicit {
                month_letter: 'U',
                year_2digit: 26
            })
        );
    }

    #[test]
    fn parses_bare_cash_index() {
        let s: Symbol = "IX:SPX".parse().unwrap();
        assert!(s.is_single_segment());
        assert_eq!(s.root, "SPX");
    }

    #[test]
    fn round_trips_to_display() {
        for token in ["EQ:AAPL", "FX:EURUSD", "IX:ES.A", "IX:ES1", "IX:ESU26", "IX:SPX"] {
            let s: Symbol = token.parse().unwrap();
            assert_eq!(s.to_string(), token);
        }
    }

    #[test]
    fn rejects_missing_namespace() {
        assert!("SPY".parse::<Symbol>().is_err());
    }

    #[test]
    fn rejects_unknown_namespace() {
        assert!("XX:SPY".parse::<Symbol>().is_err());
    }
}

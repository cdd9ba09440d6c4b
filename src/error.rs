//! The crate's single error taxonomy.
//!
//! Every fallible operation in quantdesk returns `Result<T, Error>`. The
//! variants separate client errors (bad input), resolution errors
//! (symbol/contract lookup), upstream errors
//! (the broker session), and one internal variant reserved for invariant
//! violations that should never occur outside of a bug.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    // --- client errors ---
    #[error("could not parse expression: {0}")]
    ParseError(String),
    #[error("malformed symbol token: {0}")]
    MalformedToken(String),
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),
    #[error("requested range is empty")]
    EmptyRange,

    // --- resolution errors ---
    #[error("unknown futures root: {0}")]
    UnknownRoot(String),
    #[error("no contract chain covers the requested range for {0}")]
    NoChainForRange(String),

    // --- upstream errors ---
    #[error("upstream session unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream pacing violation")]
    PacingViolation,
    #[error("upstream has no data farm connection")]
    NoDataFarm,
    #[error("request timed out")]
    Timeout,
    #[error("request was cancelled")]
    Cancelled,

    // --- expression evaluation ---
    #[error("expression produced no data")]
    EmptyResult,

    // --- internal ---
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Coarse classification used by the HTTP layer to pick a status code and
/// by the retry policy to decide whether a failure is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Resolution,
    Upstream,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseError(_)
            | Self::MalformedToken(_)
            | Self::UnknownSymbol(_)
            | Self::UnsupportedParameter(_)
            | Self::EmptyRange
            | Self::EmptyResult => ErrorKind::Client,
            Self::UnknownRoot(_) | Self::NoChainForRange(_) => ErrorKind::Resolution,
            Self::UpstreamUnavailable(_)
            | Self::PacingViolation
            | Self::NoDataFarm
            | Self::Timeout
            | Self::Cancelled => ErrorKind::Upstream,
            Self::Invariant(_) => ErrorKind::Internal,
        }
    }

    /// Only these kinds are retried by the coordinator.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_) | Self::PacingViolation | Self::NoDataFarm
        )
    }

    /// Stable machine-readable tag used in the `{"error": {"kind": ...}}`
    /// JSON body.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "ParseError",
            Self::MalformedToken(_) => "MalformedToken",
            Self::UnknownSymbol(_) => "UnknownSymbol",
            Self::UnsupportedParameter(_) => "UnsupportedParameter",
            Self::EmptyRange => "EmptyRange",
            Self::UnknownRoot(_) => "UnknownRoot",
            Self::NoChainForRange(_) => "NoChainForRange",
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::PacingViolation => "PacingViolation",
            Self::NoDataFarm => "NoDataFarm",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::EmptyResult => "EmptyResult",
            Self::Invariant(_) => "Invariant",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Client => "client",
            Self::Resolution => "resolution",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_matches_spec() {
        assert!(Error::UpstreamUnavailable("x".into()).is_retryable());
        assert!(Error::PacingViolation.is_retryable());
        assert!(Error::NoDataFarm.is_retryable());
        assert!(!Error::Timeout.is_retryable());
        assert!(!Error::MalformedToken("x".into()).is_retryable());
    }

    #[test]
    fn kinds_partition_the_taxonomy() {
        assert_eq!(Error::EmptyRange.kind(), ErrorKind::Client);
        assert_eq!(Error::UnknownRoot("ES".into()).kind(), ErrorKind::Resolution);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Upstream);
        assert_eq!(Error::Invariant("x".into()).kind(), ErrorKind::Internal);
    }
}

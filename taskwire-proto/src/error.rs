//! Stable error taxonomy surfaced to clients.

use serde::{Deserialize, Serialize};

/// Machine-readable error kind carried by every user-visible error, on both
/// the HTTP surface (`{"error": "<kind>", "message": ...}`) and the stream
/// surface (`error` frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing, malformed, or expired credential. Terminates the session.
    Unauthenticated,
    /// Valid credential, insufficient scope for the requested topic/team/user.
    Forbidden,
    /// The operation references an unknown task or notification id.
    NotFound,
    /// A required field is missing or invalid.
    InvalidInput,
    /// The per-identity request ceiling was exceeded.
    RateLimited,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            Self::Forbidden => write!(f, "FORBIDDEN"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidInput => write!(f, "INVALID_INPUT"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
        }
    }
}

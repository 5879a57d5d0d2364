//! Error types.

use std::fmt;

/// Invalid tunables, reported when a gate is constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is too large to count in milliseconds")]
    TooLarge { field: &'static str },

    #[error("bucket granularity ({granularity_secs}s) must be smaller than the window ({window_secs}s)")]
    BucketNotFinerThanWindow {
        granularity_secs: u64,
        window_secs: u64,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },
}

/// Failure of the authoritative credential store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("credential store timed out")]
    Timeout,

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// A token the codec could not read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed credential: {0}")]
pub struct CodecError(pub String);

/// Why a principal was refused.
///
/// Callers outside the crate should treat every variant the same way; the
/// distinction exists for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// The cache holds a different token for this principal.
    StaleOrForgedCredential,
    /// The store has no such principal.
    UnknownPrincipal,
    /// No issued token, or the presented one does not match it.
    InvalidCredential,
    /// The store's token for this principal has itself expired.
    ExpiredCredential,
}

impl UnauthenticatedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnauthenticatedReason::StaleOrForgedCredential => "stale or forged credential",
            UnauthenticatedReason::UnknownPrincipal => "unknown principal",
            UnauthenticatedReason::InvalidCredential => "invalid credential",
            UnauthenticatedReason::ExpiredCredential => "expired credential",
        }
    }
}

impl fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The credential was refused.
    #[error("unauthenticated: {0}")]
    Unauthenticated(UnauthenticatedReason),

    /// The credential store could not answer.  Transient; never cached and
    /// never reported as a refusal.
    #[error("credential authority unavailable")]
    AuthorityUnavailable(#[source] StoreError),
}

impl AuthError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::Unauthenticated(_))
    }

    pub fn reason(&self) -> Option<UnauthenticatedReason> {
        match self {
            AuthError::Unauthenticated(reason) => Some(*reason),
            AuthError::AuthorityUnavailable(_) => None,
        }
    }
}

impl From<UnauthenticatedReason> for AuthError {
    fn from(reason: UnauthenticatedReason) -> Self {
        AuthError::Unauthenticated(reason)
    }
}

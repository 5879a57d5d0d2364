//! Cache-backed admission and authentication gates.
//!
//! Two gates sit in front of a request handler:
//!
//! - [`AdmissionGate`] counts requests per client over a sliding window and
//!   rejects clients that exceed their limit.
//! - [`AuthenticationGate`] verifies `(principal, token)` pairs against a
//!   short-lived [`CredentialCache`] and falls back to an authoritative
//!   [`CredentialStore`] on a miss.
//!
//! Both are built on [`Cache`], a bounded concurrent cache with per-entry
//! expiry.  [`Gatekeeper`] wires the gates and a [`RoutePolicy`] together in
//! request order.

mod builder;
mod cache;
mod gatekeeper;
mod metrics;
mod policy;
mod routes;
mod store;

pub mod auth;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod expiry;
pub mod listener;
pub mod rate;

pub use auth::{
    AuthenticationGate, CachedCredential, Capabilities, CredentialCache, CredentialCodec,
    CredentialStore, MemoryCredentialStore, Principal,
};
pub use builder::CacheBuilder;
pub use cache::Cache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CredentialCacheConfig, GateConfig, RateLimitConfig};
pub use error::{AuthError, CodecError, ConfigError, StoreError, UnauthenticatedReason};
pub use gatekeeper::{Gatekeeper, RequestContext, Verdict};
pub use metrics::stats::CacheStats;
pub use rate::{Admission, AdmissionGate, RateWindowCounter, RATE_LIMIT_EXCEEDED};
pub use routes::{CapabilityRule, Requirement, RoutePolicy};

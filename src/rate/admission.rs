use std::sync::Arc;

use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::ConfigError;
use crate::rate::RateWindowCounter;
use crate::routes::RoutePolicy;

/// Reason attached to a rejected request.
pub const RATE_LIMIT_EXCEEDED: &str = "rate limit exceeded";

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Counted and let through.
    Admitted,
    /// The route is not rate limited; nothing was counted.
    Bypassed,
    /// The client is over its limit.  The request was not counted.
    Rejected(&'static str),
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected(_))
    }
}

/// Applies a [`RateWindowCounter`] to the routes a [`RoutePolicy`] marks as
/// rate limited.
#[derive(Clone)]
pub struct AdmissionGate {
    counter: RateWindowCounter,
    routes: Arc<RoutePolicy>,
}

impl AdmissionGate {
    pub fn new(config: &RateLimitConfig, routes: Arc<RoutePolicy>) -> Result<Self, ConfigError> {
        Ok(Self::with_counter(RateWindowCounter::new(config)?, routes))
    }

    pub fn with_counter(counter: RateWindowCounter, routes: Arc<RoutePolicy>) -> Self {
        AdmissionGate { counter, routes }
    }

    pub fn admit(&self, route: &str, client: &str) -> Admission {
        if !self.routes.is_rate_limited(route) {
            return Admission::Bypassed;
        }
        if self.counter.record_and_check(client) {
            warn!(client, route, reason = RATE_LIMIT_EXCEEDED, "request rejected");
            return Admission::Rejected(RATE_LIMIT_EXCEEDED);
        }
        Admission::Admitted
    }

    pub fn counter(&self) -> &RateWindowCounter {
        &self.counter
    }
}

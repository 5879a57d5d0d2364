//! The request pipeline: admission, then authentication, then authorization.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{AuthenticationGate, Capabilities, CredentialCodec, CredentialStore};
use crate::clock::{SharedClock, SystemClock};
use crate::config::GateConfig;
use crate::error::{AuthError, ConfigError};
use crate::rate::{Admission, AdmissionGate, RateWindowCounter};
use crate::routes::RoutePolicy;

/// The parts of an inbound request the gates look at.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Client identity used for admission control, typically the remote
    /// address.
    pub client: &'a str,
    /// Bearer token, without the scheme.
    pub bearer: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allowed {
        /// `None` on public routes.
        principal: Option<String>,
        capabilities: Capabilities,
    },
    TooManyRequests,
    Forbidden(&'static str),
    /// The credential authority could not be consulted.
    ServerError,
}

impl Verdict {
    pub fn status_code(&self) -> u16 {
        match self {
            Verdict::Allowed { .. } => 200,
            Verdict::TooManyRequests => 429,
            Verdict::Forbidden(_) => 403,
            Verdict::ServerError => 500,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed { .. })
    }
}

/// Both gates plus the route table, wired in request order.
#[derive(Clone)]
pub struct Gatekeeper {
    admission: AdmissionGate,
    auth: AuthenticationGate,
    codec: Arc<dyn CredentialCodec>,
    routes: Arc<RoutePolicy>,
}

impl Gatekeeper {
    pub fn new(
        config: GateConfig,
        store: Arc<dyn CredentialStore>,
        codec: Arc<dyn CredentialCodec>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, store, codec, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: GateConfig,
        store: Arc<dyn CredentialStore>,
        codec: Arc<dyn CredentialCodec>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let routes = Arc::new(config.routes);
        let counter = RateWindowCounter::with_clock(&config.rate_limit, Arc::clone(&clock))?;
        let auth =
            AuthenticationGate::with_clock(&config.credentials, store, Arc::clone(&codec), clock)?;
        Ok(Gatekeeper {
            admission: AdmissionGate::with_counter(counter, Arc::clone(&routes)),
            auth,
            codec,
            routes,
        })
    }

    pub fn check(&self, req: &RequestContext<'_>) -> Verdict {
        if let Admission::Rejected(_) = self.admission.admit(req.path, req.client) {
            return Verdict::TooManyRequests;
        }

        if self.routes.is_public(req.path) {
            return Verdict::Allowed {
                principal: None,
                capabilities: Capabilities::new(),
            };
        }

        let Some(token) = req.bearer.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!(path = req.path, "no bearer credential");
            return Verdict::Forbidden("credential not found");
        };

        let principal = match self.codec.subject(token) {
            Ok(principal) => principal,
            Err(e) => {
                warn!(path = req.path, error = %e, "unreadable credential");
                return Verdict::Forbidden("invalid credential");
            }
        };

        let capabilities = match self.auth.authenticate(&principal, token) {
            Ok(capabilities) => capabilities,
            Err(AuthError::Unauthenticated(reason)) => return Verdict::Forbidden(reason.as_str()),
            Err(AuthError::AuthorityUnavailable(_)) => return Verdict::ServerError,
        };

        if !self
            .routes
            .requirement(req.method, req.path)
            .is_satisfied_by(&capabilities)
        {
            warn!(
                principal = %principal,
                method = req.method,
                path = req.path,
                "insufficient capability"
            );
            return Verdict::Forbidden("insufficient capability");
        }

        Verdict::Allowed {
            principal: Some(principal),
            capabilities,
        }
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.admission
    }

    pub fn authentication(&self) -> &AuthenticationGate {
        &self.auth
    }
}

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{
    CachedCredential, Capabilities, CredentialCache, CredentialCodec, CredentialStore,
};
use crate::clock::{SharedClock, SystemClock};
use crate::config::CredentialCacheConfig;
use crate::error::{AuthError, ConfigError, UnauthenticatedReason};

/// Cache-first verification of `(principal, token)` pairs.
///
/// A cached credential is trusted for its whole TTL: a matching token
/// succeeds and a mismatching one fails, both without consulting the
/// authority.  Only a cache miss reaches the [`CredentialStore`], and only a
/// successful verification populates the cache.  Callers that rotate a
/// principal's token must go through [`remember`](Self::remember) or
/// [`forget`](Self::forget) so the cache never pins a superseded token.  An
/// authority lookup that overlaps either call still answers its request but
/// leaves the cache as that call left it.
#[derive(Clone)]
pub struct AuthenticationGate {
    cache: CredentialCache,
    store: Arc<dyn CredentialStore>,
    codec: Arc<dyn CredentialCodec>,
}

impl AuthenticationGate {
    pub fn new(
        config: &CredentialCacheConfig,
        store: Arc<dyn CredentialStore>,
        codec: Arc<dyn CredentialCodec>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, store, codec, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &CredentialCacheConfig,
        store: Arc<dyn CredentialStore>,
        codec: Arc<dyn CredentialCodec>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        Ok(AuthenticationGate {
            cache: CredentialCache::new(config, clock)?,
            store,
            codec,
        })
    }

    pub fn authenticate(
        &self,
        principal_id: &str,
        presented: &str,
    ) -> Result<Capabilities, AuthError> {
        if let Some(cached) = self.cache.lookup(principal_id) {
            if cached.token == presented {
                debug!(principal = principal_id, "credential accepted from cache");
                return Ok(cached.capabilities.clone());
            }
            return Err(refuse(
                principal_id,
                UnauthenticatedReason::StaleOrForgedCredential,
            ));
        }
        self.verify_with_authority(principal_id, presented)
    }

    fn verify_with_authority(
        &self,
        principal_id: &str,
        presented: &str,
    ) -> Result<Capabilities, AuthError> {
        let generation = self.cache.generation(principal_id);
        let principal = self.store.lookup(principal_id).map_err(|e| {
            warn!(principal = principal_id, error = %e, "credential authority unavailable");
            AuthError::AuthorityUnavailable(e)
        })?;
        let Some(principal) = principal else {
            return Err(refuse(principal_id, UnauthenticatedReason::UnknownPrincipal));
        };

        match principal.current_token.as_deref() {
            None => return Err(refuse(principal_id, UnauthenticatedReason::InvalidCredential)),
            Some(issued) if self.codec.is_expired(issued) => {
                return Err(refuse(principal_id, UnauthenticatedReason::ExpiredCredential));
            }
            Some(issued) if issued != presented => {
                return Err(refuse(principal_id, UnauthenticatedReason::InvalidCredential));
            }
            Some(_) => {}
        }

        debug!(principal = principal_id, "credential verified by authority");
        let cached = self.cache.store_if_unchanged(
            principal_id,
            generation,
            CachedCredential {
                token: presented.to_owned(),
                capabilities: principal.capabilities.clone(),
            },
        );
        if !cached {
            // remember or forget ran during the lookup; their state wins
            debug!(principal = principal_id, "credential changed during lookup, not cached");
        }
        Ok(principal.capabilities)
    }

    /// Caches a freshly issued credential, replacing whatever was cached.  The
    /// new entry gets a full TTL.
    pub fn remember(&self, principal_id: &str, token: &str, capabilities: Capabilities) {
        self.cache.invalidate(principal_id);
        self.cache.store(
            principal_id,
            CachedCredential {
                token: token.to_owned(),
                capabilities,
            },
        );
    }

    /// The token currently cached for `principal_id`, if still live.
    pub fn cached_token(&self, principal_id: &str) -> Option<String> {
        self.cache.lookup(principal_id).map(|c| c.token.clone())
    }

    pub fn forget(&self, principal_id: &str) {
        self.cache.invalidate(principal_id);
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.cache
    }
}

fn refuse(principal_id: &str, reason: UnauthenticatedReason) -> AuthError {
    warn!(principal = principal_id, %reason, "credential refused");
    AuthError::Unauthenticated(reason)
}

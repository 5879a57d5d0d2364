use std::sync::Arc;

use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};

use crate::auth::Capabilities;
use crate::builder::CacheBuilder;
use crate::cache::Cache;
use crate::clock::SharedClock;
use crate::config::CredentialCacheConfig;
use crate::error::ConfigError;
use crate::metrics::stats::CacheStats;

/// Last credential the authority accepted for a principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedCredential {
    pub token: String,
    pub capabilities: Capabilities,
}

/// Number of generation stripes.  Must be a power of two.
const GENERATION_STRIPES: usize = 64;

/// Principal id → last known good credential.
///
/// Entries live for a fixed time from when they were first cached.  Reads and
/// overwrites do not extend that, so a credential is re-verified against the
/// authority at least once per TTL however busy the principal is.
///
/// Every explicit write or invalidation bumps a generation shared by the
/// principal's stripe.  A verification that started before such a change
/// reads the generation first and caches its result through
/// [`store_if_unchanged`](Self::store_if_unchanged), which refuses once the
/// generation has moved.
#[derive(Clone)]
pub struct CredentialCache {
    entries: Cache<String, CachedCredential>,
    generations: Arc<[Mutex<u64>]>,
    hasher: RandomState,
}

impl CredentialCache {
    pub fn new(config: &CredentialCacheConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;
        let entries = CacheBuilder::new(config.max_entries)
            .name("credentials")
            .time_to_live(config.ttl())
            .clock(clock)
            .build();
        Ok(CredentialCache {
            entries,
            generations: (0..GENERATION_STRIPES).map(|_| Mutex::new(0)).collect(),
            hasher: RandomState::new(),
        })
    }

    pub fn lookup(&self, principal_id: &str) -> Option<Arc<CachedCredential>> {
        self.entries.get(&principal_id.to_owned())
    }

    /// Caches `credential`, replacing whatever was there.
    pub fn store(&self, principal_id: &str, credential: CachedCredential) {
        let mut generation = self.stripe(principal_id);
        *generation += 1;
        self.entries.insert(principal_id.to_owned(), credential);
    }

    /// Current generation of `principal_id`'s stripe.
    pub fn generation(&self, principal_id: &str) -> u64 {
        *self.stripe(principal_id)
    }

    /// Caches `credential` only if nothing was stored or invalidated for the
    /// principal since `generation` was read, and no entry is live.  Returns
    /// whether it was cached.
    pub fn store_if_unchanged(
        &self,
        principal_id: &str,
        generation: u64,
        credential: CachedCredential,
    ) -> bool {
        let current = self.stripe(principal_id);
        *current == generation && self.entries.insert_if_absent(principal_id.to_owned(), credential)
    }

    pub fn invalidate(&self, principal_id: &str) {
        let mut generation = self.stripe(principal_id);
        *generation += 1;
        self.entries.invalidate(&principal_id.to_owned());
    }

    pub fn invalidate_all(&self) {
        let mut stripes: Vec<MutexGuard<'_, u64>> =
            self.generations.iter().map(|g| g.lock()).collect();
        for generation in stripes.iter_mut() {
            **generation += 1;
        }
        self.entries.invalidate_all();
    }

    pub fn contains(&self, principal_id: &str) -> bool {
        self.entries.contains(&principal_id.to_owned())
    }

    pub fn len(&self) -> usize {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }

    fn stripe(&self, principal_id: &str) -> MutexGuard<'_, u64> {
        let stripe = self.hasher.hash_one(principal_id) as usize & (GENERATION_STRIPES - 1);
        self.generations[stripe].lock()
    }
}

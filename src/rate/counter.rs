use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::builder::CacheBuilder;
use crate::cache::Cache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::ConfigError;
use crate::listener::RemovalCause;

/// Number of client lock stripes.  Must be a power of two.
const LOCK_STRIPES: usize = 64;

/// Bucket start (epoch millis) → requests counted in that bucket.
type Buckets = Cache<u64, u32>;

/// Sliding-window request counter, one window per client.
///
/// Each client owns a small cache of time buckets.  A bucket lives for one
/// window from the moment it is created, so bucket expiry is what slides the
/// window forward.  A client's bucket cache is itself an entry of an outer
/// cache that forgets the client after an idle period.
///
/// Check-then-increment is atomic per client.  Clients are serialized through
/// a fixed set of striped locks, so unrelated clients rarely contend.
#[derive(Clone)]
pub struct RateWindowCounter {
    clients: Cache<String, Buckets>,
    locks: Arc<[Mutex<()>]>,
    hasher: RandomState,
    clock: SharedClock,
    max_requests: u32,
    window: Duration,
    granularity_ms: u64,
}

impl RateWindowCounter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RateLimitConfig, clock: SharedClock) -> Result<Self, ConfigError> {
        config.validate()?;

        let clients = CacheBuilder::new(config.max_tracked_clients)
            .name("rate-clients")
            .time_to_idle(config.client_idle_timeout())
            .clock(Arc::clone(&clock))
            .removal_listener(|client: &String, _buckets: Arc<Buckets>, cause| match cause {
                RemovalCause::Expired => info!(client = %client, "idle client state reclaimed"),
                RemovalCause::Capacity => info!(client = %client, "client state evicted"),
                RemovalCause::Explicit | RemovalCause::Replaced => {}
            })
            .build();

        Ok(RateWindowCounter {
            clients,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
            clock,
            max_requests: config.max_requests_per_window,
            window: config.window(),
            granularity_ms: config.bucket_granularity_secs.saturating_mul(1000),
        })
    }

    /// Counts one request for `client_id` unless the client is already at its
    /// limit.  Returns `true` if the limit was exceeded, in which case nothing
    /// was counted.
    pub fn record_and_check(&self, client_id: &str) -> bool {
        let now_ms = self.clock.epoch_millis();
        let bucket = now_ms - now_ms % self.granularity_ms;
        let window_start = now_ms.saturating_sub(self.window.as_millis() as u64);

        let _guard = self.lock(client_id);
        let buckets = self
            .clients
            .get_or_compute(client_id.to_owned(), |_| self.new_buckets());

        let used = sum_since(&buckets, window_start);
        if used >= self.max_requests {
            debug!(client = client_id, used, limit = self.max_requests, "window full");
            return true;
        }

        let count = buckets.get(&bucket).map_or(0, |c| *c) + 1;
        buckets.insert(bucket, count);
        debug!(client = client_id, bucket, count, used = used + 1, "request counted");
        false
    }

    /// Requests currently counted against `client_id`, or `None` if the client
    /// is not tracked.  Does not refresh the client's idle timer.
    pub fn usage(&self, client_id: &str) -> Option<u32> {
        let now_ms = self.clock.epoch_millis();
        let window_start = now_ms.saturating_sub(self.window.as_millis() as u64);
        let buckets = self.clients.peek(&client_id.to_owned())?;
        Some(sum_since(&buckets, window_start))
    }

    /// `true` while the counter still holds state for `client_id`.
    pub fn is_tracked(&self, client_id: &str) -> bool {
        self.clients.contains(&client_id.to_owned())
    }

    /// Number of clients with live state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.run_pending_tasks();
        self.clients.entry_count()
    }

    /// Drops all per-client state.
    pub fn clear(&self) {
        let _guards: Vec<MutexGuard<'_, ()>> = self.locks.iter().map(|l| l.lock()).collect();
        for (_, buckets) in self.clients.snapshot() {
            buckets.invalidate_all();
        }
        self.clients.invalidate_all();
        debug!("rate counter cleared");
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self, client_id: &str) -> MutexGuard<'_, ()> {
        let stripe = self.hasher.hash_one(client_id) as usize & (LOCK_STRIPES - 1);
        self.locks[stripe].lock()
    }

    fn new_buckets(&self) -> Buckets {
        // A client never needs more buckets than requests it may make.
        CacheBuilder::new(self.max_requests as usize)
            .name("rate-buckets")
            .num_shards(1)
            .time_to_live(self.window)
            .clock(Arc::clone(&self.clock))
            .build()
    }
}

fn sum_since(buckets: &Buckets, window_start: u64) -> u32 {
    buckets
        .snapshot()
        .into_iter()
        .filter(|(start, _)| *start >= window_start)
        .fold(0u32, |acc, (_, count)| acc.saturating_add(*count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Wall-clock millis on a minute boundary.
    const ALIGNED: u64 = 1_700_000_040_000;

    fn counter(max: u32, window_secs: u64) -> (RateWindowCounter, ManualClock) {
        let clock = ManualClock::starting_at(ALIGNED);
        let config = RateLimitConfig {
            max_requests_per_window: max,
            window_secs,
            ..RateLimitConfig::default()
        };
        let counter = RateWindowCounter::with_clock(&config, Arc::new(clock.clone())).unwrap();
        (counter, clock)
    }

    #[test]
    fn rejection_is_not_counted() {
        let (c, _) = counter(2, 180);
        assert!(!c.record_and_check("a"));
        assert!(!c.record_and_check("a"));
        assert!(c.record_and_check("a"));
        assert!(c.record_and_check("a"));
        assert_eq!(c.usage("a"), Some(2));
    }

    #[test]
    fn requests_across_buckets_share_the_window() {
        let (c, clock) = counter(3, 180);
        assert!(!c.record_and_check("a"));
        clock.advance(Duration::from_secs(61));
        assert!(!c.record_and_check("a"));
        clock.advance(Duration::from_secs(61));
        assert!(!c.record_and_check("a"));
        assert!(c.record_and_check("a"));

        // first bucket has slid out of the window
        clock.advance(Duration::from_secs(60));
        assert_eq!(c.usage("a"), Some(2));
        assert!(!c.record_and_check("a"));
    }

    #[test]
    fn bucket_count_never_exceeds_limit() {
        let (c, clock) = counter(3, 600);
        for _ in 0..10 {
            c.record_and_check("a");
            clock.advance(Duration::from_secs(61));
        }
        let buckets = c.clients.get(&"a".to_string()).unwrap();
        assert!(buckets.entry_count() <= 3);
    }

    #[test]
    fn usage_is_none_for_unknown_client() {
        let (c, _) = counter(2, 180);
        assert_eq!(c.usage("nobody"), None);
        assert!(!c.is_tracked("nobody"));
    }

    #[test]
    fn usage_does_not_keep_idle_client_alive() {
        let (c, clock) = counter(5, 600);
        assert!(!c.record_and_check("a"));

        clock.advance(Duration::from_secs(200));
        assert_eq!(c.usage("a"), Some(1));

        clock.advance(Duration::from_secs(100));
        assert!(!c.is_tracked("a"), "idle timeout counts from the last request");
        assert_eq!(c.usage("a"), None);
    }

    #[test]
    fn clear_forgets_everyone() {
        let (c, _) = counter(1, 180);
        assert!(!c.record_and_check("a"));
        assert!(!c.record_and_check("b"));
        c.clear();
        assert_eq!(c.tracked_clients(), 0);
        assert!(!c.record_and_check("a"));
    }
}

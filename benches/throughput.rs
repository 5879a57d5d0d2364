//! Throughput benchmarks for the cache and both gates.
//!
//! Run with:
//!     cargo bench --bench throughput

use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tollgate::{
    AuthenticationGate, CacheBuilder, Capabilities, CodecError, CredentialCacheConfig,
    CredentialCodec, MemoryCredentialStore, Principal, RateLimitConfig, RateWindowCounter,
};

/// Number of entries each cache is pre-filled with and its logical capacity.
const CAP: u64 = 10_000;

/// Operations executed per criterion iteration (hot-loop size).
const OPS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Group 1: cache get_hit
// ---------------------------------------------------------------------------
// All keys are present. Measures read throughput with and without a read
// policy that reschedules deadlines.

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));

    let variants: [(&str, tollgate::Cache<u64, u64>); 3] = [
        ("no_expiry", CacheBuilder::new(CAP as usize).build()),
        (
            "ttl",
            CacheBuilder::new(CAP as usize)
                .time_to_live(Duration::from_secs(3_600))
                .build(),
        ),
        (
            "tti",
            CacheBuilder::new(CAP as usize)
                .time_to_idle(Duration::from_secs(3_600))
                .build(),
        ),
    ];

    for (name, cache) in variants {
        for i in 0..CAP {
            cache.insert(i, i * 2);
        }
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                for i in 0..OPS {
                    black_box(cache.get(black_box(&i)));
                }
            })
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 2: insert_evicting
// ---------------------------------------------------------------------------
// Sequential inserts of always-new keys. The cache evicts on every insert
// once full.

fn bench_insert_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_evicting");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("lru", |b| {
        let cache: tollgate::Cache<u64, u64> = CacheBuilder::new(CAP as usize).build();
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), black_box(key));
                key = key.wrapping_add(1);
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 3: admission
// ---------------------------------------------------------------------------
// `record_and_check` against many distinct clients (mostly admitted) and
// against one client that is over its limit (always rejected).

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    group.throughput(Throughput::Elements(OPS));

    let config = RateLimitConfig {
        max_requests_per_window: 1_000_000,
        max_tracked_clients: CAP as usize,
        ..RateLimitConfig::default()
    };
    let many = RateWindowCounter::new(&config).unwrap();
    let clients: Vec<String> = (0..CAP).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
    group.bench_function("distinct_clients", |b| {
        let mut n = 0usize;
        b.iter(|| {
            for _ in 0..OPS {
                black_box(many.record_and_check(&clients[n % clients.len()]));
                n = n.wrapping_add(1);
            }
        })
    });

    let limited = RateWindowCounter::new(&RateLimitConfig::default()).unwrap();
    while !limited.record_and_check("hot-client") {}
    group.bench_function("rejected_client", |b| {
        b.iter(|| {
            for _ in 0..OPS {
                black_box(limited.record_and_check(black_box("hot-client")));
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 4: authentication
// ---------------------------------------------------------------------------

struct NeverExpires;

impl CredentialCodec for NeverExpires {
    fn is_expired(&self, _token: &str) -> bool {
        false
    }

    fn subject(&self, token: &str) -> Result<String, CodecError> {
        Ok(token.to_string())
    }
}

fn bench_authentication(c: &mut Criterion) {
    const PRINCIPALS: u64 = 100;

    let store = Arc::new(MemoryCredentialStore::new());
    for i in 0..PRINCIPALS {
        store.upsert(Principal {
            id: format!("user-{i}"),
            current_token: Some(format!("token-{i}")),
            capabilities: ["STAFF"].into_iter().collect::<Capabilities>(),
        });
    }
    let pairs: Vec<(String, String)> = (0..PRINCIPALS)
        .map(|i| (format!("user-{i}"), format!("token-{i}")))
        .collect();

    let mut group = c.benchmark_group("authenticate");
    group.throughput(Throughput::Elements(OPS));

    let warm = AuthenticationGate::new(
        &CredentialCacheConfig::default(),
        store.clone(),
        Arc::new(NeverExpires),
    )
    .unwrap();
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            for i in 0..OPS as usize {
                let (id, token) = &pairs[i % pairs.len()];
                black_box(warm.authenticate(id, token).is_ok());
            }
        })
    });

    let cold = AuthenticationGate::new(
        &CredentialCacheConfig::default(),
        store.clone(),
        Arc::new(NeverExpires),
    )
    .unwrap();
    group.bench_function("authority_fallback", |b| {
        b.iter(|| {
            for i in 0..OPS as usize {
                let (id, token) = &pairs[i % pairs.len()];
                cold.forget(id);
                black_box(cold.authenticate(id, token).is_ok());
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 5: concurrent admission, 8 threads over disjoint clients
// ---------------------------------------------------------------------------

fn bench_concurrent_admission(c: &mut Criterion) {
    const THREADS: usize = 8;
    const OPS_PER_THREAD: u64 = 2_000;
    const CLIENTS_PER_THREAD: u64 = 64;

    let mut group = c.benchmark_group("concurrent_admission_8t");
    group.throughput(Throughput::Elements(THREADS as u64 * OPS_PER_THREAD));

    let config = RateLimitConfig {
        max_requests_per_window: 1_000_000,
        max_tracked_clients: CAP as usize,
        ..RateLimitConfig::default()
    };
    let counter = RateWindowCounter::new(&config).unwrap();

    group.bench_function("striped_locks", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let barrier = Arc::new(Barrier::new(THREADS + 1));
                let handles: Vec<_> = (0..THREADS)
                    .map(|t| {
                        let counter = counter.clone();
                        let bar = Arc::clone(&barrier);
                        std::thread::spawn(move || {
                            let clients: Vec<String> = (0..CLIENTS_PER_THREAD)
                                .map(|i| format!("t{t}-c{i}"))
                                .collect();
                            bar.wait();
                            let start = Instant::now();
                            for j in 0..OPS_PER_THREAD {
                                let client = &clients[(j % CLIENTS_PER_THREAD) as usize];
                                black_box(counter.record_and_check(client));
                            }
                            start.elapsed()
                        })
                    })
                    .collect();
                barrier.wait();
                let elapsed = handles.into_iter().map(|h| h.join().unwrap()).max().unwrap();
                total += elapsed;
            }
            total
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_insert_evicting,
    bench_admission,
    bench_authentication,
    bench_concurrent_admission,
);
criterion_main!(benches);

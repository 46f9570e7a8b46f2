//! Timestep Cache Concurrency Tests
//!
//! Many threads sharing one cache must always observe complete sequences
//! equal to a fresh generation, whatever the interleaving of hits, misses
//! and evictions.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use std::sync::Arc;
use std::thread;
use voltage_timeseries::{generate_timesteps, TimeSeriesGeneratorOptions, TimestepCache, Timesteps};

const THREADS: usize = 8;
const ROUNDS: usize = 200;

fn options(variant: usize) -> TimeSeriesGeneratorOptions {
    let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let step = [10, 15, 30, 60][variant % 4];
    TimeSeriesGeneratorOptions::time_steps(start, start + Duration::days(1), step)
}

fn zone(variant: usize) -> FixedOffset {
    FixedOffset::east_opt(((variant / 4) % 3) as i32 * 3600).unwrap()
}

fn cached(cache: &TimestepCache, variant: usize) -> Timesteps {
    let zone = zone(variant);
    cache.generate(&options(variant), &zone, &zone.to_string()).unwrap()
}

#[test]
fn test_concurrent_generate_returns_complete_sequences() {
    let cache = TimestepCache::new(64);

    thread::scope(|s| {
        for worker in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let variant = (worker * 7 + round) % 12;
                    let got = cached(cache, variant);
                    let expected = generate_timesteps(&options(variant), &zone(variant)).unwrap();
                    assert_eq!(&got[..], &expected[..]);
                }
            });
        }
    });

    assert_eq!(cache.hits() + cache.misses(), (THREADS * ROUNDS) as u64);
    assert!(cache.misses() >= 12);
    assert_eq!(cache.len(), 12);
}

#[test]
fn test_eviction_under_contention_keeps_entries_whole() {
    // Smaller than the key space, so threads keep evicting each other
    let cache = TimestepCache::new(3);

    thread::scope(|s| {
        for worker in 0..THREADS {
            let cache = &cache;
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let variant = (worker + round) % 12;
                    let got = cached(cache, variant);
                    let step = options(variant).timestep_minutes as i64;
                    assert!(got.windows(2).all(|w| w[1] - w[0] == Duration::minutes(step)));
                }
            });
        }
    });

    assert!(cache.len() <= 3);
}

#[test]
fn test_resize_while_in_use() {
    let cache = Arc::new(TimestepCache::new(12));

    thread::scope(|s| {
        for worker in 0..4 {
            let cache = Arc::clone(&cache);
            s.spawn(move || {
                for round in 0..ROUNDS {
                    let variant = (worker + round) % 12;
                    assert!(!cached(&cache, variant).is_empty());
                }
            });
        }
        let cache = Arc::clone(&cache);
        s.spawn(move || {
            for capacity in [6, 2, 12, 1, 8] {
                cache.resize(capacity);
                thread::yield_now();
            }
        });
    });

    assert_eq!(cache.capacity(), 8);
    assert!(cache.len() <= 8);
}

//! End-to-end scenarios mirroring spec.md §8's literal test matrix (S1-S6).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use wtlfu::sync::Cache;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// S1: capacity 1000, 20 000 inserts drawn from a 100 000-key universe.
/// After quiescence the cache must stay well under capacity plus slack.
#[test]
fn s1_random_fill_stays_bounded() {
    init_logging();
    let cache: Cache<String, String> = Cache::new(1000);
    let mut rng = rand::thread_rng();
    for _ in 0..20_000 {
        let k = rng.gen_range(0..100_000);
        let key = format!("key:{k}");
        cache.insert(key.clone(), key);
    }
    cache.run_pending_tasks();
    assert!(
        cache.entry_count() < 1200,
        "entry_count={} exceeded the tolerated overshoot",
        cache.entry_count()
    );
}

/// S2: basic set/get/delete round trip.
#[test]
fn s2_set_get_delete_round_trip() {
    let cache: Cache<String, String> = Cache::new(100);
    cache.insert("foo".to_string(), "foo".to_string());
    cache.run_pending_tasks();
    assert_eq!(
        cache.get(&"foo".to_string()).map(|v| (*v).clone()),
        Some("foo".to_string())
    );
    cache.invalidate(&"foo".to_string());
    assert_eq!(cache.get(&"foo".to_string()), None);
}

/// S3: re-inserting a key with a shorter TTL must still expire it.
#[test]
fn s3_shorter_ttl_on_overwrite_still_expires() {
    let cache: Cache<String, String> = Cache::new(500);
    cache.insert_with_ttl(
        "foo".to_string(),
        "foo".to_string(),
        Duration::from_secs(3600),
    );
    cache.run_pending_tasks();
    assert_eq!(cache.entry_count(), 1);

    std::thread::sleep(Duration::from_secs(1));
    cache.insert_with_ttl("foo".to_string(), "foo".to_string(), Duration::from_secs(1));
    cache.run_pending_tasks();
    assert_eq!(cache.entry_count(), 1);

    std::thread::sleep(Duration::from_secs(2));
    cache.run_pending_tasks();
    assert_eq!(cache.get(&"foo".to_string()), None);
    assert_eq!(cache.entry_count(), 0);
}

/// S4: a ladder of staggered TTLs should drain to a stable floor and then
/// keep the short-TTL keys expired while their `:2`-suffixed siblings
/// (100s+ out) remain live.
#[test]
fn s4_staggered_ttl_ladder_drains_monotonically() {
    let cache: Cache<String, String> = Cache::new(500);
    for i in 0..30u64 {
        cache.insert_with_ttl(
            format!("key:{i}"),
            i.to_string(),
            Duration::from_secs(i + 1),
        );
        cache.insert_with_ttl(
            format!("key:{i}:2"),
            i.to_string(),
            Duration::from_secs(i + 100),
        );
    }
    cache.run_pending_tasks();
    assert_eq!(cache.entry_count(), 60);

    let mut last = cache.entry_count();
    let mut reached_floor = false;
    for _ in 0..9 {
        std::thread::sleep(Duration::from_secs(5));
        cache.run_pending_tasks();
        let now = cache.entry_count();
        assert!(now <= last, "entry_count grew from {last} to {now}");
        last = now;
        if now == 30 {
            reached_floor = true;
            break;
        }
    }
    assert!(reached_floor, "never reached the 30-entry floor, last={last}");
    for i in 0..30u64 {
        assert_eq!(cache.get(&format!("key:{i}")), None);
    }
}

/// S5: concurrent get-or-set from many threads must never observe a value
/// that doesn't match the key it was stored under, and must stay bounded
/// after quiescence.
#[test]
fn s5_concurrent_get_or_set_is_consistent() {
    let cache: Cache<String, String> = Cache::new(1000);
    std::thread::scope(|scope| {
        for _ in 0..12 {
            let cache = cache.clone();
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..10_000 {
                    let k = rng.gen_range(0..3000);
                    let key = format!("key:{k}");
                    match cache.get(&key) {
                        Some(v) => assert_eq!(*v, key),
                        None => cache.insert(key.clone(), key),
                    }
                }
            });
        }
    });
    cache.run_pending_tasks();
    assert!(
        cache.entry_count() < 1200,
        "entry_count={} exceeded the tolerated overshoot",
        cache.entry_count()
    );
}

/// S6: an entry whose cost exceeds total capacity is rejected outright.
#[test]
fn s6_oversized_cost_is_rejected() {
    let cache: Cache<String, String> = Cache::new(100);
    cache.insert_with_weight("huge".to_string(), "huge".to_string(), 1000);
    cache.run_pending_tasks();
    assert_eq!(cache.get(&"huge".to_string()), None);
    assert_eq!(cache.entry_count(), 0);
}

/// A quiescence barrier makes a just-inserted key immediately visible, and
/// cloned handles observe the same underlying state.
#[test]
fn cloned_handles_share_state() {
    let cache: Cache<String, Arc<String>> = Cache::new(100);
    let other = cache.clone();
    cache.insert("shared".to_string(), Arc::new("value".to_string()));
    cache.run_pending_tasks();
    assert_eq!(
        other.get(&"shared".to_string()).map(|v| (**v).clone()),
        Some("value".to_string())
    );
}

/// `iter()` yields a snapshot that reflects entries present at call time.
#[test]
fn iter_snapshots_live_entries() {
    let cache: Cache<String, u64> = Cache::new(100);
    for i in 0..10u64 {
        cache.insert(format!("key:{i}"), i);
    }
    cache.run_pending_tasks();
    let snapshot: Vec<_> = cache.iter().collect();
    assert_eq!(snapshot.len(), 10);
}

use pitlane_core::AgentCache;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
struct TestAgent {
    session_id: String,
    serial: usize,
}

type Cache = AgentCache<TestAgent, String>;

/// Set `RUST_LOG=pitlane_core=debug` to see cache decisions while a test runs.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn build(key: String, calls: Arc<AtomicUsize>, delay: Duration) -> Result<TestAgent, String> {
    let serial = calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(delay).await;
    Ok(TestAgent {
        session_id: key,
        serial,
    })
}

async fn create(cache: &Cache, key: &str, calls: &Arc<AtomicUsize>) -> Arc<TestAgent> {
    let calls = calls.clone();
    cache
        .get_or_create(key, move |k| build(k, calls, Duration::ZERO))
        .await
        .unwrap()
}

// ── Single-flight ────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_access_same_session_constructs_once() {
    init_logging();
    let cache = Cache::new(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let session_id = new_session_id();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let cache = cache.clone();
        let calls = calls.clone();
        let key = session_id.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_create(key, move |k| build(k, calls, Duration::from_millis(10)))
                .await
        }));
    }

    let mut agents = Vec::new();
    for handle in handles {
        agents.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = &agents[0];
    assert!(agents.iter().all(|a| Arc::ptr_eq(a, first)));
    assert_eq!(first.session_id, session_id);
    assert_eq!(first.serial, 0);
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.pending_count(), 0);

    let stats = cache.stats();
    assert_eq!(stats.constructions, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits + stats.coalesced, 99);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_propagates_to_every_waiter() {
    init_logging();
    let cache = Cache::new(4);
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let calls = calls.clone();
        let release = release.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_create("s", move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    Err::<TestAgent, _>("workspace unavailable".to_string())
                })
                .await
        }));
    }

    // Let every task join the in-flight construction before it fails
    while cache.stats().misses + cache.stats().coalesced < 20 {
        tokio::task::yield_now().await;
    }
    release.notify_one();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.as_str(), "workspace unavailable");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn test_failure_then_retry_succeeds() {
    let cache = Cache::new(4);

    let err = cache
        .get_or_create("s", |_| async { Err::<TestAgent, _>("first attempt".to_string()) })
        .await
        .unwrap_err();
    assert_eq!(err.as_str(), "first attempt");
    assert!(!cache.contains("s"));

    let calls = Arc::new(AtomicUsize::new(0));
    let agent = create(&cache, "s", &calls).await;

    assert_eq!(agent.session_id, "s");
    assert!(cache.contains("s"));
    assert_eq!(cache.size(), 1);
}

#[tokio::test]
async fn test_dropped_waiter_does_not_strand_construction() {
    let cache = Cache::new(4);
    let calls = Arc::new(AtomicUsize::new(0));

    // Abandon the only caller while its constructor is sleeping
    let slow = {
        let calls = calls.clone();
        cache.get_or_create("s", move |k| build(k, calls, Duration::from_millis(50)))
    };
    let timed_out = tokio::time::timeout(Duration::from_millis(5), slow).await;
    assert!(timed_out.is_err());
    assert_eq!(cache.pending_count(), 1);

    // The construction finishes and commits with nobody waiting on it
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.pending_count(), 0);
    assert!(cache.contains("s"));

    let agent = create(&cache, "s", &calls).await;
    assert_eq!(agent.serial, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abandoned_constructions_all_commit() {
    let cache = Cache::new(64);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..50 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let fut = cache.get_or_create(format!("s{}", i), move |k| {
                build(k, calls, Duration::from_millis(20))
            });
            tokio::time::timeout(Duration::from_millis(1), fut).await.is_err()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap(), "caller should have timed out");
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 50);
    assert_eq!(cache.pending_count(), 0);
    assert_eq!(cache.size(), 50);
    assert_eq!(cache.stats().constructions, 50);
    for i in 0..50 {
        assert!(cache.contains(&format!("s{}", i)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pending_key_does_not_block_other_keys() {
    let cache = Cache::new(8);
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let committed = create(&cache, "committed", &calls).await;

    let held = {
        let cache = cache.clone();
        let release = release.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("held", move |k| async move {
                    release.notified().await;
                    Ok(TestAgent {
                        session_id: k,
                        serial: usize::MAX,
                    })
                })
                .await
        })
    };

    while cache.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    let limit = Duration::from_secs(1);

    let other = {
        let calls = calls.clone();
        tokio::time::timeout(
            limit,
            cache.get_or_create("other", move |k| build(k, calls, Duration::from_millis(5))),
        )
        .await
        .expect("unrelated key waited on a pending construction")
        .unwrap()
    };
    assert_eq!(other.session_id, "other");

    let hit = tokio::time::timeout(limit, create(&cache, "committed", &calls))
        .await
        .expect("hit waited on a pending construction");
    assert!(Arc::ptr_eq(&hit, &committed));

    assert!(cache.evict("other"));
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.pending_count(), 1);
    assert!(!cache.contains("held"));

    release.notify_one();
    let held = held.await.unwrap().unwrap();
    assert_eq!(held.session_id, "held");
    assert!(cache.contains("held"));
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test]
async fn test_lru_scenario_capacity_three() {
    let cache = Cache::new(3);
    let calls = Arc::new(AtomicUsize::new(0));

    create(&cache, "A", &calls).await;
    create(&cache, "B", &calls).await;
    create(&cache, "C", &calls).await;
    assert_eq!(cache.size(), 3);

    create(&cache, "A", &calls).await;
    create(&cache, "D", &calls).await;

    assert_eq!(cache.size(), 3);
    assert!(cache.contains("A"));
    assert!(!cache.contains("B"));
    assert!(cache.contains("C"));
    assert!(cache.contains("D"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_capacity_plus_one_evicts_first() {
    let capacity = 5;
    let cache = Cache::new(capacity);
    let calls = Arc::new(AtomicUsize::new(0));
    let keys: Vec<String> = (1..=capacity + 1).map(|i| format!("k{}", i)).collect();

    for key in &keys {
        create(&cache, key, &calls).await;
    }

    assert!(!cache.contains("k1"));
    assert!(keys[1..].iter().all(|k| cache.contains(k)));
    assert_eq!(cache.size(), capacity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lru_ordering_with_concurrent_hits() {
    let cache = Cache::new(3);
    let calls = Arc::new(AtomicUsize::new(0));

    create(&cache, "s1", &calls).await;
    create(&cache, "s2", &calls).await;
    create(&cache, "s3", &calls).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move { create(&cache, "s1", &calls).await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    create(&cache, "s4", &calls).await;

    assert_eq!(cache.size(), 3);
    assert!(!cache.contains("s2"));
    assert!(cache.contains("s1"));
    assert!(cache.contains("s3"));
    assert!(cache.contains("s4"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

// ── Mixed workloads ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_fresh_keys_fill_to_capacity() {
    let cache = Cache::new(20);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            let key = new_session_id();
            cache
                .get_or_create(key, move |k| build(k, calls, Duration::from_millis(1)))
                .await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let agent = handle.await.unwrap().expect("construction should succeed");
        seen.insert(agent.session_id.clone());
    }

    assert_eq!(seen.len(), 50);
    assert_eq!(cache.size(), 20);
    assert_eq!(calls.load(Ordering::SeqCst), 50);
    assert_eq!(cache.stats().evictions, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_eviction_racing_with_access() {
    let cache = Cache::new(2);
    let calls = Arc::new(AtomicUsize::new(0));
    let s1 = new_session_id();

    create(&cache, &s1, &calls).await;
    create(&cache, &new_session_id(), &calls).await;

    for _ in 0..100 {
        let a = {
            let cache = cache.clone();
            let calls = calls.clone();
            let s1 = s1.clone();
            tokio::spawn(async move { create(&cache, &s1, &calls).await })
        };
        let b = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move { create(&cache, &new_session_id(), &calls).await })
        };

        a.await.unwrap();
        b.await.unwrap();
        assert!(cache.size() <= 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_stress_mixed_operations_respect_capacity() {
    init_logging();
    let cache = Cache::new(20);
    let calls = Arc::new(AtomicUsize::new(0));
    let keys: Arc<Vec<String>> = Arc::new((0..30).map(|_| new_session_id()).collect());

    let mut handles = Vec::new();
    for worker in 0..50usize {
        let cache = cache.clone();
        let calls = calls.clone();
        let keys = keys.clone();
        handles.push(tokio::spawn(async move {
            for step in 0..10usize {
                let key = &keys[(worker * 7 + step * 13) % keys.len()];
                match step % 5 {
                    4 => {
                        cache.evict(key);
                    }
                    _ => {
                        create(&cache, key, &calls).await;
                    }
                }
                assert!(cache.size() <= 20);
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(cache.size() <= 20);
    assert_eq!(cache.pending_count(), 0);
    assert_eq!(cache.keys().len(), cache.size());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_manual_evictions() {
    let cache = Cache::new(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ids: Vec<String> = (0..5).map(|_| new_session_id()).collect();

    for id in &ids {
        create(&cache, id, &calls).await;
    }
    assert_eq!(cache.size(), 5);

    let mut handles = Vec::new();
    for id in ids.clone() {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.evict(&id) }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(cache.size(), 0);
}

// ── Clear ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_clear_forces_fresh_construction() {
    let cache = Cache::new(10);
    let calls = Arc::new(AtomicUsize::new(0));

    let before = create(&cache, "s", &calls).await;
    cache.clear();
    assert_eq!(cache.size(), 0);

    let after = create(&cache, "s", &calls).await;
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_clear_lets_in_flight_construction_commit() {
    init_logging();
    let cache = Cache::new(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    create(&cache, "old", &calls).await;

    let pending = {
        let cache = cache.clone();
        let release = release.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("new", move |k| async move {
                    release.notified().await;
                    Ok::<_, String>(TestAgent {
                        session_id: k,
                        serial: 99,
                    })
                })
                .await
        })
    };

    while cache.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    cache.clear();
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.pending_count(), 1);

    release.notify_one();
    let agent = pending.await.unwrap().unwrap();

    assert_eq!(agent.serial, 99);
    assert_eq!(cache.keys(), vec!["new".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_clear_between_concurrent_batches() {
    let cache = Cache::new(10);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let batch = |cache: Cache, calls: Arc<AtomicUsize>| async move {
            let mut handles = Vec::new();
            for _ in 0..5 {
                let cache = cache.clone();
                let calls = calls.clone();
                handles.push(tokio::spawn(async move {
                    create(&cache, &new_session_id(), &calls).await
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
        };

        batch(cache.clone(), calls.clone()).await;
        cache.clear();
        batch(cache.clone(), calls.clone()).await;

        assert_eq!(cache.size(), 5);
        cache.clear();
    }
}

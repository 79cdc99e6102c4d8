//! Deduplicator behavior under real concurrency

mod common;

use risk_lookup_core::clock::SystemClock;
use risk_lookup_core::config::DedupConfig;
use risk_lookup_core::events::MemoryEventSink;
use risk_lookup_core::{ClassifiedError, Deduplicator, RequestKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn deduplicator<T: Clone + Send + Sync + 'static>() -> Deduplicator<T> {
    Deduplicator::new(DedupConfig::default(), SystemClock::shared(), MemoryEventSink::new(16))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_execution() {
    let dedup = deduplicator::<String>();
    let key = RequestKey::from("order_id=42|phone=+15550100");
    let invocations = Arc::new(AtomicUsize::new(0));
    let (release, gate) = watch::channel(false);

    let mut handles = Vec::new();
    for _ in 0..50 {
        let dedup = dedup.clone();
        let key = key.clone();
        let invocations = invocations.clone();
        let mut gate = gate.clone();
        handles.push(tokio::spawn(async move {
            dedup
                .execute(key, move || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    let _ = gate.wait_for(|open| *open).await;
                    Ok(format!("profile-{}", 7))
                })
                .await
        }));
    }

    while dedup.waiter_count(&key) != Some(50) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    release.send(true).unwrap();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == "profile-7"));
    assert_eq!(dedup.pending_count(), 0);

    let stats = dedup.stats();
    assert_eq!(stats.executions_started, 1);
    assert_eq!(stats.coalesced, 49);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_reaches_every_waiter() {
    let dedup = deduplicator::<u32>();
    let key = RequestKey::from("checkout_token=abc");
    let (release, gate) = watch::channel(false);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let dedup = dedup.clone();
        let key = key.clone();
        let mut gate = gate.clone();
        handles.push(tokio::spawn(async move {
            dedup
                .execute(key, move || async move {
                    let _ = gate.wait_for(|open| *open).await;
                    Err(ClassifiedError::dependency_unavailable("profile store down"))
                })
                .await
        }));
    }

    while dedup.waiter_count(&key) != Some(10) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    release.send(true).unwrap();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err, ClassifiedError::dependency_unavailable("profile store down"));
    }
    assert_eq!(dedup.pending_count(), 0);
}

#[tokio::test]
async fn test_distinct_keys_run_independently() {
    let dedup = deduplicator::<usize>();
    let invocations = Arc::new(AtomicUsize::new(0));

    let run = |key: &'static str| {
        let dedup = dedup.clone();
        let invocations = invocations.clone();
        async move {
            dedup
                .execute(RequestKey::from(key), move || async move {
                    Ok(invocations.fetch_add(1, Ordering::SeqCst))
                })
                .await
        }
    };

    let (a, b) = tokio::join!(run("phone=1"), run("phone=2"));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_first_caller_does_not_strand_followers() {
    let dedup = deduplicator::<u32>();
    let key = RequestKey::from("order_name=#1001");
    let (release, gate) = watch::channel(false);

    let leader = {
        let dedup = dedup.clone();
        let key = key.clone();
        let mut gate = gate.clone();
        tokio::spawn(async move {
            dedup
                .execute(key, move || async move {
                    let _ = gate.wait_for(|open| *open).await;
                    Ok(11)
                })
                .await
        })
    };
    while dedup.pending_count() == 0 {
        tokio::task::yield_now().await;
    }

    let follower = {
        let dedup = dedup.clone();
        let key = key.clone();
        tokio::spawn(async move { dedup.execute(key, || async { Ok(99) }).await })
    };
    while dedup.waiter_count(&key) != Some(2) {
        tokio::task::yield_now().await;
    }

    leader.abort();
    release.send(true).unwrap();

    assert_eq!(follower.await.unwrap().unwrap(), 11);
}

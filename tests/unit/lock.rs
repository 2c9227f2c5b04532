//! Tests for the per-resource lock registry

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kafka_rebalance_operator::controller::lock::{LockRegistry, ResourceKey};

#[tokio::test]
async fn holders_of_one_key_are_mutually_exclusive() {
    let registry = Arc::new(LockRegistry::new(Duration::from_secs(5)));
    let key = ResourceKey::new("ns", "r");
    let in_section = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let key = key.clone();
        let in_section = in_section.clone();
        let max_seen = max_seen.clone();
        handles.push(tokio::spawn(async move {
            let _guard = registry.acquire(&key).await.unwrap();
            let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            in_section.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timed_out_caller_does_not_steal_the_lock() {
    let registry = Arc::new(LockRegistry::new(Duration::from_millis(10)));
    let key = ResourceKey::new("ns", "r");

    let holder = registry.acquire(&key).await.unwrap();
    assert!(registry.acquire(&key).await.is_err());

    // The original holder still owns the key; releasing it lets a new
    // caller in
    drop(holder);
    assert!(registry.acquire(&key).await.is_ok());
}

#[tokio::test]
async fn queued_caller_runs_after_release() {
    let registry = Arc::new(LockRegistry::new(Duration::from_secs(5)));
    let key = ResourceKey::new("ns", "r");

    let first = registry.acquire(&key).await.unwrap();

    let waiter = {
        let registry = registry.clone();
        let key = key.clone();
        tokio::spawn(async move { registry.acquire(&key).await.is_ok() })
    };

    tokio::task::yield_now().await;
    drop(first);

    assert!(waiter.await.unwrap());
}

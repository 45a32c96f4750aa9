//! Tests for backend registry management

use gatekeeper::proxy::backend::{Backend, BackendRegistry};
use std::collections::HashSet;
use std::time::Duration;

#[test]
fn test_backend_address() {
    let backend = Backend::new("127.0.0.1", 9000);
    assert_eq!(backend.address(), "127.0.0.1:9000");
    assert!(backend.matches("127.0.0.1", 9000));
    assert!(!backend.matches("127.0.0.1", 9001));
}

#[tokio::test]
async fn test_registry_empty_selects_none() {
    let registry = BackendRegistry::new();

    assert!(registry.select_backend().await.is_none());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_registry_round_robin_selection() {
    let registry = BackendRegistry::new();
    registry.register_backend("10.0.0.1", 8000).await;
    registry.register_backend("10.0.0.2", 8000).await;
    registry.register_backend("10.0.0.3", 8000).await;

    // The cursor advances before reading, so rotation starts at the second entry
    let picks: Vec<String> = select_n(&registry, 6).await;
    assert_eq!(
        picks,
        vec![
            "10.0.0.2:8000",
            "10.0.0.3:8000",
            "10.0.0.1:8000",
            "10.0.0.2:8000",
            "10.0.0.3:8000",
            "10.0.0.1:8000",
        ]
    );
}

#[tokio::test]
async fn test_registry_full_cycle_covers_every_backend_once() {
    let registry = BackendRegistry::new();
    for port in 9000..9007 {
        registry.register_backend("127.0.0.1", port).await;
    }

    let picks = select_n(&registry, 7).await;
    let unique: HashSet<_> = picks.iter().collect();
    assert_eq!(unique.len(), 7);
}

#[tokio::test]
async fn test_registry_single_backend_repeats() {
    let registry = BackendRegistry::new();
    registry.register_backend("localhost", 3000).await;

    for _ in 0..3 {
        let backend = registry.select_backend().await.unwrap();
        assert_eq!(backend.address(), "localhost:3000");
    }
}

#[tokio::test(start_paused = true)]
async fn test_registry_register_is_idempotent() {
    let registry = BackendRegistry::new();
    registry.register_backend("127.0.0.1", 9000).await;
    let first = registry.snapshot().await[0].last_heartbeat;

    tokio::time::advance(Duration::from_secs(2)).await;
    registry.register_backend("127.0.0.1", 9000).await;

    let snapshot = registry.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].last_heartbeat > first);
}

#[tokio::test]
async fn test_registry_same_host_different_ports_are_distinct() {
    let registry = BackendRegistry::new();
    registry.register_backend("127.0.0.1", 9000).await;
    registry.register_backend("127.0.0.1", 9001).await;

    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn test_registry_selection_returns_copy() {
    let registry = BackendRegistry::new();
    registry.register_backend("127.0.0.1", 9000).await;

    let selected = registry.select_backend().await.unwrap();
    registry.prune_stale(Duration::ZERO).await;

    // Pruning the registry does not affect the copy already handed out
    assert_eq!(selected.address(), "127.0.0.1:9000");
}

#[tokio::test(start_paused = true)]
async fn test_registry_prune_stale() {
    let registry = BackendRegistry::new();
    registry.register_backend("old-1", 80).await;
    registry.register_backend("old-2", 80).await;

    tokio::time::advance(Duration::from_secs(20)).await;
    registry.register_backend("fresh", 80).await;
    registry.register_backend("old-2", 80).await;

    tokio::time::advance(Duration::from_secs(15)).await;
    registry.prune_stale(Duration::from_secs(30)).await;

    let remaining: Vec<String> = registry
        .snapshot()
        .await
        .iter()
        .map(|b| b.address())
        .collect();
    // Order of survivors is preserved
    assert_eq!(remaining, vec!["old-2:80", "fresh:80"]);
}

#[tokio::test(start_paused = true)]
async fn test_registry_prune_keeps_backend_at_exact_age() {
    let registry = BackendRegistry::new();
    registry.register_backend("edge", 80).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    registry.prune_stale(Duration::from_secs(30)).await;

    assert_eq!(registry.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_registry_selection_after_prune_stays_in_range() {
    let registry = BackendRegistry::new();
    registry.register_backend("a", 1).await;
    registry.register_backend("b", 1).await;
    registry.register_backend("c", 1).await;

    // Cursor now points at "c"
    registry.select_backend().await;
    registry.select_backend().await;

    tokio::time::advance(Duration::from_secs(60)).await;
    registry.register_backend("a", 1).await;
    registry.prune_stale(Duration::from_secs(30)).await;

    let backend = registry.select_backend().await.unwrap();
    assert_eq!(backend.host, "a");
}

#[tokio::test(start_paused = true)]
async fn test_registry_prune_everything() {
    let registry = BackendRegistry::new();
    registry.register_backend("a", 1).await;
    registry.register_backend("b", 1).await;

    tokio::time::advance(Duration::from_secs(60)).await;
    registry.prune_stale(Duration::from_secs(30)).await;

    assert!(registry.select_backend().await.is_none());

    registry.register_backend("c", 1).await;
    assert_eq!(registry.select_backend().await.unwrap().host, "c");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_concurrent_registration() {
    let registry = BackendRegistry::new();

    let mut handles = Vec::new();
    for i in 0..50u16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            // Every task registers the same 10 addresses
            registry.register_backend("10.0.0.1", 9000 + (i % 10)).await;
            registry.select_backend().await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_some());
    }

    assert_eq!(registry.len().await, 10);
}

async fn select_n(registry: &BackendRegistry, n: usize) -> Vec<String> {
    let mut picks = Vec::with_capacity(n);
    for _ in 0..n {
        picks.push(registry.select_backend().await.unwrap().address());
    }
    picks
}

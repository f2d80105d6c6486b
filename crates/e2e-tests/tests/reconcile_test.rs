//! Orphan reconciliation across crash-shaped inconsistencies.

use pretty_assertions::assert_eq;

use chunkstore_adapters::{MetadataStore, VectorIndex};
use e2e_tests::{embedded_record, TestHarness};

/// Vectors written behind the orchestrator's back have no binding and are
/// swept; a second run immediately after finds nothing.
#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (harness, vectors) = TestHarness::new();
    let store = &harness.store;

    store.upsert_one(embedded_record("A", 8)).await.unwrap();
    store.upsert_one(embedded_record("B", 8)).await.unwrap();

    vectors.add_vectors(&[vec![0.9; 8]]).await.unwrap();
    vectors.add_vectors(&[vec![0.8; 8]]).await.unwrap();
    assert_eq!(vectors.count().await.unwrap(), 4);

    let removed = store.clean_orphan_vectors().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(vectors.count().await.unwrap(), 2);

    let removed_again = store.clean_orphan_vectors().await.unwrap();
    assert_eq!(removed_again, 0);
}

/// A record whose metadata vanished (crashed hard delete) leaves a bound
/// vector behind; reconciliation restores count parity.
#[tokio::test]
async fn test_reconcile_after_lost_metadata() {
    let (harness, vectors) = TestHarness::new();
    let store = &harness.store;

    store.upsert_one(embedded_record("A", 8)).await.unwrap();
    store.upsert_one(embedded_record("B", 8)).await.unwrap();

    // The record hash disappears without the vector side being told.
    harness
        .metadata
        .delete(&["record:A".to_string()])
        .await
        .unwrap();
    assert_eq!(store.count_active(false).await.unwrap(), 1);
    assert_eq!(vectors.count().await.unwrap(), 2);

    let removed = store.clean_orphan_vectors().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(vectors.count().await.unwrap(), 1);
    assert_eq!(
        store.count_active(false).await.unwrap(),
        vectors.count().await.unwrap()
    );

    // The survivor still resolves both ways after the sweep.
    let b = store.get_one("B", true, false).await.unwrap().unwrap();
    assert_eq!(b.index_position, Some(0));
    assert!(b.embedding.is_some());
}

/// Soft-deleted records keep their vectors through reconciliation.
#[tokio::test]
async fn test_reconcile_spares_soft_deleted() {
    let (harness, vectors) = TestHarness::new();
    let store = &harness.store;

    store.upsert_one(embedded_record("A", 8)).await.unwrap();
    store.delete_soft_one("A").await.unwrap();

    assert_eq!(store.clean_orphan_vectors().await.unwrap(), 0);
    assert_eq!(vectors.count().await.unwrap(), 1);
}

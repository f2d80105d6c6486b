//! Query facade end-to-end: search, visibility, query-driven deletes.

use pretty_assertions::assert_eq;

use chunkstore_adapters::VectorIndex;
use chunkstore_core::{ChunkStoreError, DeleteMode};
use chunkstore_types::{Record, SearchCriteria};
use e2e_tests::TestHarness;

async fn seed(store: &chunkstore_core::ChunkStore) {
    let records = [
        ("doc-1", "rust", "ownership and borrowing in rust", vec![1.0, 0.0]),
        ("doc-2", "rust", "async rust with tokio", vec![0.9, 0.1]),
        ("doc-3", "python", "asyncio event loops", vec![0.0, 1.0]),
    ];
    for (id, lang, title, embedding) in records {
        store
            .upsert_one(
                Record::new(id)
                    .with_field("lang", lang)
                    .with_field("title", title)
                    .with_embedding(embedding),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_text_search_ranks_matches() {
    let (harness, _) = TestHarness::new();
    seed(&harness.store).await;

    let criteria = SearchCriteria::new().with_text("rust ownership");
    let hits = harness.store.search(&criteria, None, 0).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, "doc-1");
    assert!(hits[0].score >= hits[hits.len() - 1].score);
}

#[tokio::test]
async fn test_vector_search_finds_nearest() {
    let (harness, _) = TestHarness::new();
    seed(&harness.store).await;

    let criteria = SearchCriteria::new().with_vector(vec![0.95, 0.05]);
    let hits = harness.store.search(&criteria, Some(1), 0).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc-1");
}

#[tokio::test]
async fn test_structured_filter_with_paging() {
    let (harness, _) = TestHarness::new();
    seed(&harness.store).await;

    let criteria = SearchCriteria::new().with_filter("lang", "rust");
    let first = harness.store.search(&criteria, Some(1), 0).await.unwrap();
    let second = harness.store.search(&criteria, Some(1), 1).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0].id, second[0].id);
}

#[tokio::test]
async fn test_criteria_must_not_be_empty() {
    let (harness, _) = TestHarness::new();
    let result = harness
        .store
        .search(&SearchCriteria::new(), None, 0)
        .await;
    assert!(matches!(result, Err(ChunkStoreError::Validation(_))));
}

#[tokio::test]
async fn test_find_by_query_visibility() {
    let (harness, _) = TestHarness::new();
    let store = &harness.store;
    seed(store).await;
    store.delete_soft_one("doc-2").await.unwrap();

    let criteria = SearchCriteria::new().with_filter("lang", "rust");
    let visible = store
        .find_by_query(&criteria, false, None, 0)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, "doc-1");

    let all = store.find_by_query(&criteria, true, None, 0).await.unwrap();
    assert_eq!(all.len(), 2);

    assert_eq!(store.count_by_query(&criteria, false).await.unwrap(), 1);
    assert_eq!(store.count_by_query(&criteria, true).await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_by_query_hard_removes_matches() {
    let (harness, vectors) = TestHarness::new();
    let store = &harness.store;
    seed(store).await;

    let criteria = SearchCriteria::new().with_filter("lang", "rust");
    let removed = store
        .delete_by_query(&criteria, DeleteMode::Hard)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    assert_eq!(store.list_ids(None).await.unwrap(), vec!["doc-3"]);
    assert_eq!(vectors.count().await.unwrap(), 1);

    // The matched records are gone from the index as well.
    let hits = store.search(&criteria, None, 0).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_delete_by_query_soft_keeps_vectors() {
    let (harness, vectors) = TestHarness::new();
    let store = &harness.store;
    seed(store).await;

    let criteria = SearchCriteria::new().with_filter("lang", "python");
    let removed = store
        .delete_by_query(&criteria, DeleteMode::Soft)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert_eq!(store.count_active(false).await.unwrap(), 2);
    assert_eq!(store.count_all().await.unwrap(), 3);
    assert_eq!(vectors.count().await.unwrap(), 3);
}

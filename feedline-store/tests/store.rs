use chrono::{TimeZone, Utc};
use feedline_common::{IngestError, StorageError, TweetMetrics, TweetRow};
use feedline_store::{StoreConfig, TweetStore};
use std::collections::HashSet;
use tempfile::TempDir;

async fn open_store(tmp: &TempDir) -> TweetStore {
    let url = format!("sqlite://{}", tmp.path().join("feedline.db").display());
    let store = TweetStore::connect(&StoreConfig {
        database_url: url,
        ..Default::default()
    })
    .await
    .expect("connect");
    store.ensure_schema().await.expect("schema");
    store
}

fn row(tid: &str, minute: u32) -> TweetRow {
    TweetRow {
        created_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()),
        metrics: Some(TweetMetrics {
            like_count: Some(1),
            ..Default::default()
        }),
        ..TweetRow::new(tid, format!("tweet {tid}"), "test")
    }
}

fn tids(rows: &[TweetRow]) -> Vec<String> {
    rows.iter().map(|r| r.tid.clone()).collect()
}

#[tokio::test]
async fn second_upsert_of_same_rows_inserts_nothing() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let rows = vec![row("1", 1), row("2", 2), row("3", 3)];

    assert_eq!(store.upsert(1, &rows).await.unwrap(), 3);
    let first = store.list(1, 10).await.unwrap();

    assert_eq!(store.upsert(1, &rows).await.unwrap(), 0);
    let second = store.list(1, 10).await.unwrap();

    assert_eq!(tids(&first), tids(&second));
    assert_eq!(second.len(), 3);
    assert_eq!(store.count(1).await.unwrap(), 3);
}

#[tokio::test]
async fn overlapping_window_counts_only_new_tids() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert(1, &[row("1", 1), row("2", 2)]).await.unwrap();
    let inserted = store
        .upsert(1, &[row("2", 2), row("3", 3), row("4", 4)])
        .await
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(store.count(1).await.unwrap(), 4);
}

#[tokio::test]
async fn conflict_updates_mutable_fields_in_place() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut original = row("7", 7);
    original.author_username = Some("alice".into());
    store.upsert(1, &[original]).await.unwrap();

    // Newer fetch: more likes, different source, no includes section.
    let mut refreshed = row("7", 7);
    refreshed.src = "live".into();
    refreshed.metrics = Some(TweetMetrics {
        like_count: Some(40),
        reply_count: Some(2),
        ..Default::default()
    });
    assert_eq!(store.upsert(1, &[refreshed]).await.unwrap(), 0);

    let listed = store.list(1, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    let got = &listed[0];
    assert_eq!(got.src, "live");
    assert_eq!(got.metrics.unwrap().like_count, Some(40));
    assert_eq!(got.metrics.unwrap().reply_count, Some(2));
    // absent metadata does not erase what was stored
    assert_eq!(got.author_username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn owners_do_not_see_each_other() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert(1, &[row("1", 1), row("2", 2)]).await.unwrap();
    assert!(store.list(2, 10).await.unwrap().is_empty());

    // Same tid under another owner is a separate row.
    assert_eq!(store.upsert(2, &[row("1", 1)]).await.unwrap(), 1);
    assert_eq!(tids(&store.list(2, 10).await.unwrap()), vec!["1"]);
    assert_eq!(store.count(1).await.unwrap(), 2);
}

#[tokio::test]
async fn list_respects_limit_and_recency() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let rows: Vec<TweetRow> = (0..5).map(|i| row(&format!("t{i}"), i * 10)).collect();
    store.upsert(1, &rows).await.unwrap();

    let two = store.list(1, 2).await.unwrap();
    assert_eq!(tids(&two), vec!["t4", "t3"]);
    assert_eq!(store.list(1, 50).await.unwrap().len(), 5);
}

#[tokio::test]
async fn rows_without_timestamp_fall_back_to_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store
        .upsert(1, &[TweetRow::new("a", "first", "test")])
        .await
        .unwrap();
    store
        .upsert(1, &[TweetRow::new("b", "second", "test")])
        .await
        .unwrap();

    let listed = store.list(1, 10).await.unwrap();
    assert_eq!(tids(&listed), vec!["b", "a"]);
}

#[tokio::test]
async fn non_positive_limit_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    for limit in [0, -3] {
        assert!(matches!(
            store.list(1, limit).await.unwrap_err(),
            IngestError::Config(_)
        ));
    }
}

#[tokio::test]
async fn invalid_rows_are_never_persisted() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let rows = vec![
        TweetRow::new("", "no id", "test"),
        TweetRow::new("9", "  ", "test"),
        row("ok", 1),
    ];
    assert_eq!(store.upsert(1, &rows).await.unwrap(), 1);
    assert_eq!(tids(&store.list(1, 10).await.unwrap()), vec!["ok"]);
    assert_eq!(store.upsert(1, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_tid_within_batch_counts_once() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let mut later = row("dup", 1);
    later.text = "edited".into();
    assert_eq!(store.upsert(1, &[row("dup", 1), later]).await.unwrap(), 1);
    let listed = store.list(1, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].text, "edited");
}

#[tokio::test]
async fn ensure_schema_is_idempotent_and_keeps_data() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.upsert(1, &[row("keep", 1)]).await.unwrap();

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();
    assert_eq!(tids(&store.list(1, 10).await.unwrap()), vec!["keep"]);

    // A second handle on the same file sees the same data.
    store.close().await;
    let reopened = open_store(&tmp).await;
    assert_eq!(reopened.count(1).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_overlapping_upserts_insert_each_tid_once() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let batches: Vec<Vec<TweetRow>> = (0..6)
        .map(|w| (w..w + 10).map(|i| row(&format!("c{i}"), i % 60)).collect())
        .collect();

    let results = futures::future::join_all(batches.iter().map(|batch| {
        let store = store.clone();
        async move { store.upsert(1, batch).await }
    }))
    .await;

    let total: u64 = results.into_iter().map(|r| r.expect("upsert")).sum();
    let listed = store.list(1, 100).await.unwrap();
    let unique: HashSet<_> = listed.iter().map(|r| r.tid.as_str()).collect();

    // c0..=c14 across all workers
    assert_eq!(unique.len(), 15);
    assert_eq!(listed.len(), 15);
    assert_eq!(total, 15);
}

#[tokio::test]
async fn failing_row_rolls_back_the_whole_batch() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    sqlx::query(
        "CREATE TRIGGER reject_boom BEFORE INSERT ON tweets \
         WHEN NEW.tid = 'boom' BEGIN SELECT RAISE(ABORT, 'boom'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let err = store
        .upsert(1, &[row("ok", 1), row("boom", 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Storage(StorageError::Backend(_))), "{err:?}");
    assert_eq!(store.count(1).await.unwrap(), 0);

    // the store stays usable afterwards
    assert_eq!(store.upsert(1, &[row("ok", 1)]).await.unwrap(), 1);
}

//! Integration tests for the database manager.

use keyshelf_core::engine::{EngineConfig, Factory, MemorySnapshotStore, ObjectStoreParameters};
use keyshelf_core::{
    ConnectionState, CoreError, Database, DatabaseConfig, DatabaseInfo, Direction, Key, KeyPath,
    StoreInfo, TransactionFailure, TransactionOutcome,
};
use keyshelf_testkit::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn opens_lazily_and_reports_the_schema() {
    let db = TestDatabase::memory();
    assert_eq!(db.state(), ConnectionState::Closed);
    assert_eq!(db.version(), 2);

    let info = db.database_info().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Open);
    assert_eq!(
        info,
        DatabaseInfo {
            name: db.name().to_string(),
            version: 2,
            object_stores: vec![
                StoreInfo {
                    name: COMPLEX_TEST_OBJECTS.to_string(),
                    key_path: Some(KeyPath::from("id")),
                    auto_increment: false,
                    indices: vec![NAME_INDEX.to_string()],
                },
                StoreInfo {
                    name: TEST_OBJECTS.to_string(),
                    key_path: Some(KeyPath::from("id")),
                    auto_increment: false,
                    indices: Vec::new(),
                },
            ],
        }
    );
}

#[tokio::test]
async fn missing_store_fails_before_any_transaction() {
    let db = TestDatabase::memory();

    let result = db
        .open_stores([TEST_OBJECTS, "Missing"], |_| async { Ok(()) })
        .await;
    let error = result.unwrap_err();
    assert_eq!(
        error.to_string(),
        "Object stores TestObjects,Missing do not exist."
    );
    assert_eq!(db.pending_transactions(), 0);
    assert!(db.flush().await.is_empty());
}

#[tokio::test]
async fn concurrent_callers_share_one_open() {
    let upgrades = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&upgrades);
    let config = DatabaseConfig::new(unique_name("single"))
        .upgrade(1, move |_, _, transaction| {
            counter.fetch_add(1, Ordering::SeqCst);
            transaction.create_object_store("items", ObjectStoreParameters::new())?;
            Ok(())
        })
        .unwrap();
    let db = TestDatabase::with_config(Factory::in_memory(), config);

    let (first, second) = tokio::join!(db.connection(), db.connection());
    assert_eq!(first.unwrap().version(), 1);
    assert_eq!(second.unwrap().version(), 1);
    assert_eq!(upgrades.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_upgrade_rejects_and_rolls_back() {
    let factory = Factory::in_memory();
    let name = unique_name("upgrade");
    let config = DatabaseConfig::new(name.clone())
        .upgrade(1, |_, _, transaction| {
            transaction.create_object_store("kept", ObjectStoreParameters::new())?;
            Ok(())
        })
        .unwrap()
        .upgrade(2, |_, _, _| Err(CoreError::migration("boom")))
        .unwrap();
    let broken = TestDatabase::with_config(factory.clone(), config);

    let result = broken.open_all_stores(|stores| async move { Ok(stores.len()) }).await;
    assert_eq!(result, Err(CoreError::migration("boom")));
    assert_eq!(broken.state(), ConnectionState::Closed);
    assert!(factory.database_names().unwrap().is_empty());

    let fixed = TestDatabase::with_config(factory.clone(), test_config(name.clone()));
    let stores = fixed
        .open_all_stores(|stores| async move {
            Ok(stores
                .iter()
                .map(|store| store.name().to_string())
                .collect::<Vec<_>>())
        })
        .await
        .unwrap();
    assert_eq!(stores, vec![COMPLEX_TEST_OBJECTS, TEST_OBJECTS]);
}

#[tokio::test]
async fn open_all_stores_without_stores_passes_an_empty_list() {
    let config = DatabaseConfig::new(unique_name("empty"));
    let db = TestDatabase::with_config(Factory::in_memory(), config);

    let count = db
        .open_all_stores(|stores| async move { Ok(stores.len()) })
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(db.pending_transactions(), 0);
}

#[tokio::test]
async fn close_then_reuse_opens_a_fresh_connection() {
    let db = TestDatabase::memory();
    db.open_store(TEST_OBJECTS, |store| async move {
        store.insert(json!({"id": 1})).await
    })
    .await
    .unwrap();

    let before = db.connection().await.unwrap();
    db.close().await;
    assert!(before.is_closed());
    assert_eq!(db.state(), ConnectionState::Closed);
    db.close().await;

    let count = db
        .open_store(TEST_OBJECTS, |store| async move { store.count().await })
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(db.state(), ConnectionState::Open);
}

#[tokio::test]
async fn delete_removes_every_record() {
    let db = TestDatabase::memory();
    db.open_store(TEST_OBJECTS, |store| async move {
        store.insert(json!([{"id": 1}, {"id": 2}])).await
    })
    .await
    .unwrap();

    db.delete().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Closed);
    assert!(db.factory().database_names().unwrap().is_empty());

    let count = db
        .open_store(TEST_OBJECTS, |store| async move { store.count().await })
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn flush_waits_for_pending_transactions() {
    let db = TestDatabase::memory();
    assert!(db.flush().await.is_empty());

    let writer = db.db.clone();
    let task = tokio::spawn(async move {
        writer
            .open_store(TEST_OBJECTS, |store| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.insert(json!({"id": 1})).await
            })
            .await
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while db.pending_transactions() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("transaction registered");

    let outcomes = db.flush().await;
    assert_eq!(outcomes, vec![TransactionOutcome::Completed]);
    assert!(task.await.unwrap().is_ok());

    let count = db
        .open_store(TEST_OBJECTS, |store| async move { store.count().await })
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn flush_reports_failed_transactions() {
    let db = TestDatabase::memory();
    db.open_store(TEST_OBJECTS, |store| async move {
        store.insert(json!({"id": 1})).await
    })
    .await
    .unwrap();

    let writer = db.db.clone();
    let task = tokio::spawn(async move {
        writer
            .open_store(TEST_OBJECTS, |store| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.insert(json!({"id": 1})).await
            })
            .await
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while db.pending_transactions() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("transaction registered");

    let outcomes = db.flush().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        &outcomes[0],
        TransactionOutcome::Failed(CoreError::Transaction {
            failure: TransactionFailure::Error,
            ..
        })
    ));
    assert!(task.await.unwrap().is_err());
    assert_eq!(db.pending_transactions(), 0);
}

#[tokio::test]
async fn overlapping_transactions_keep_each_others_commits() {
    let db = TestDatabase::memory();
    let (started, first_wrote) = tokio::sync::oneshot::channel();

    let first_db = db.db.clone();
    let first = tokio::spawn(async move {
        first_db
            .open_store(TEST_OBJECTS, |store| async move {
                store.upsert(json!({"id": 1, "v": "a"})).await?;
                let _ = started.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                store.insert(json!({"id": 1, "v": "duplicate"})).await
            })
            .await
    });

    first_wrote.await.unwrap();
    let second = db
        .open_store(TEST_OBJECTS, |store| async move {
            store.upsert(json!({"id": 1, "v": "b"})).await
        })
        .await;
    assert_eq!(second, Ok(vec![Key::from(1)]));
    assert!(matches!(
        first.await.unwrap(),
        Err(CoreError::Transaction {
            failure: TransactionFailure::Error,
            ..
        })
    ));

    let records = db
        .open_store(TEST_OBJECTS, |store| async move { store.get_all().await })
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"id": 1, "v": "b"})]);
}

#[tokio::test]
async fn blocked_upgrade_rejects_and_a_retry_starts_fresh() {
    let db = TestDatabase::memory();
    db.connection().await.unwrap();

    let config = test_config(db.name())
        .upgrade(3, |_, _, transaction| {
            transaction.create_object_store("Extra", ObjectStoreParameters::new())?;
            Ok(())
        })
        .unwrap();
    let newer = Database::new(db.factory().clone(), config);

    let blocked = newer.connection().await;
    assert_eq!(
        blocked.unwrap_err(),
        CoreError::connection("Error: Operation pending")
    );
    assert_eq!(newer.state(), ConnectionState::Closed);

    db.close().await;
    let connection = newer.connection().await.unwrap();
    assert_eq!(connection.version(), 3);
    assert!(connection
        .object_store_names()
        .contains(&"Extra".to_string()));
    assert_eq!(newer.state(), ConnectionState::Open);
}

#[tokio::test]
async fn blocked_delete_rejects_and_completes_once_unblocked() {
    let db = TestDatabase::memory();
    db.open_store(TEST_OBJECTS, |store| async move {
        store.insert(json!({"id": 1})).await
    })
    .await
    .unwrap();

    let other = db.second_manager();
    assert_eq!(
        other.delete().await,
        Err(CoreError::connection("Error: Operation pending"))
    );
    assert_eq!(other.state(), ConnectionState::Closing);

    db.close().await;
    let count = tokio::time::timeout(
        Duration::from_secs(5),
        other.open_store(TEST_OBJECTS, |store| async move { store.count().await }),
    )
    .await
    .expect("deletion finished")
    .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn nested_opens_run_independently() {
    let db = TestDatabase::memory();
    let nested = db.db.clone();

    db.open_store(TEST_OBJECTS, |outer| async move {
        let inner = nested
            .open_store(COMPLEX_TEST_OBJECTS, |store| async move {
                store.insert(json!({"id": 1, "name": "inner"})).await
            })
            .await?;
        assert_eq!(inner.len(), 1);
        outer.insert(json!({"id": 1, "name": "outer"})).await
    })
    .await
    .unwrap();

    let found = db
        .open_stores([TEST_OBJECTS, COMPLEX_TEST_OBJECTS], |stores| async move {
            let mut names = Vec::new();
            for store in &stores {
                names.push(store.find(1).await?["name"].clone());
            }
            Ok(names)
        })
        .await
        .unwrap();
    assert_eq!(found, vec![json!("outer"), json!("inner")]);
}

#[tokio::test]
async fn snapshots_outlive_the_factory() {
    let store = Arc::new(MemorySnapshotStore::new());
    let name = unique_name("snapshot");

    let first = TestDatabase::with_config(
        Factory::with_store(EngineConfig::default(), store.clone()),
        test_config(name.clone()),
    );
    first
        .open_store(TEST_OBJECTS, |objects| async move {
            objects.insert(json!({"id": "a", "n": 1})).await
        })
        .await
        .unwrap();
    first.close().await;

    let second = TestDatabase::with_config(
        Factory::with_store(EngineConfig::default(), store),
        test_config(name),
    );
    let found = second
        .open_store(TEST_OBJECTS, |objects| async move { objects.find("a").await })
        .await
        .unwrap();
    assert_eq!(found, json!({"id": "a", "n": 1}));
}

#[tokio::test]
async fn file_backed_database_reads_its_writes() {
    let db = TestDatabase::file();
    assert!(db.path().is_some());

    db.open_store(TEST_OBJECTS, |store| async move {
        store.insert(json!({"id": 1, "name": "on disk"})).await
    })
    .await
    .unwrap();

    assert_eq!(
        db.factory().database_names().unwrap(),
        vec![db.name().to_string()]
    );
    let found = db
        .open_store(TEST_OBJECTS, |store| async move { store.find(1).await })
        .await
        .unwrap();
    assert_eq!(found["name"], "on disk");
}

#[test]
fn query_direction_exposes_both_orders() {
    let db = TestDatabase::memory();
    let directions = db.query_direction();
    assert_eq!(directions.ascending, Direction::Ascending);
    assert_eq!(directions.descending, Direction::Descending);
}

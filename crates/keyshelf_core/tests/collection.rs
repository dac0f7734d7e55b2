//! Integration tests for collection operations.

use keyshelf_core::engine::{EngineConfig, Factory};
use keyshelf_core::{
    AccessMode, CoreError, Database, Direction, EachOptions, Key, TransactionFailure,
};
use keyshelf_testkit::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

async fn seed(db: &Database, store: &str, records: Vec<Value>) {
    db.open_store(store, |collection| async move {
        collection.insert_many(records).await
    })
    .await
    .expect("seed records");
}

async fn all(db: &Database, store: &str) -> Vec<Value> {
    db.open_store(store, |collection| async move { collection.get_all().await })
        .await
        .expect("read records")
}

async fn count(db: &Database, store: &str) -> u64 {
    db.open_store(store, |collection| async move { collection.count().await })
        .await
        .expect("count records")
}

fn numbered(ids: &[i64]) -> Vec<Value> {
    ids.iter()
        .map(|id| json!({"id": id, "name": format!("item {id}")}))
        .collect()
}

#[tokio::test]
async fn find_rejects_missing_key_then_resolves_after_insert() {
    let db = TestDatabase::memory();

    let missing = db
        .open_store(TEST_OBJECTS, |store| async move { store.find(1).await })
        .await;
    assert_eq!(missing, Err(CoreError::not_found(TEST_OBJECTS, Key::from(1))));
    assert_eq!(
        missing.unwrap_err().to_string(),
        "TestObjects:1 not found."
    );

    seed(&db, TEST_OBJECTS, vec![json!({"id": 1, "name": "one"})]).await;
    let found = db
        .open_store(TEST_OBJECTS, |store| async move { store.find(1).await })
        .await
        .unwrap();
    assert_eq!(found, json!({"id": 1, "name": "one"}));
}

#[tokio::test]
async fn duplicate_insert_fails_the_transaction_and_leaves_the_store_unchanged() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, vec![json!({"id": 1, "name": "original"})]).await;

    let result = db
        .open_store(TEST_OBJECTS, |store| async move {
            let inserted = store.insert(json!({"id": 1, "name": "duplicate"})).await;
            assert_eq!(
                inserted.unwrap_err().to_string(),
                "Key already exists in the object store."
            );
            Ok(())
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "Transaction Error");
    assert!(matches!(
        error,
        CoreError::Transaction {
            failure: TransactionFailure::Error,
            ..
        }
    ));
    assert_eq!(
        all(&db, TEST_OBJECTS).await,
        vec![json!({"id": 1, "name": "original"})]
    );
}

#[tokio::test]
async fn failed_batch_rolls_back_earlier_records() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[2])).await;

    let result = db
        .open_store(TEST_OBJECTS, |store| async move {
            store.insert(Value::from(numbered(&[1, 2, 3]))).await
        })
        .await;

    assert!(result.is_err());
    assert_eq!(all(&db, TEST_OBJECTS).await, numbered(&[2]));
}

#[tokio::test]
async fn upsert_replaces_existing_records() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, vec![json!({"id": 1, "name": "a"})]).await;

    let keys = db
        .open_store(TEST_OBJECTS, |store| async move {
            store.upsert(json!({"id": 1, "name": "b"})).await
        })
        .await
        .unwrap();
    assert_eq!(keys, vec![Key::from(1)]);
    assert_eq!(all(&db, TEST_OBJECTS).await, vec![json!({"id": 1, "name": "b"})]);
}

#[tokio::test]
async fn batches_resolve_every_key_and_grow_the_count() {
    let db = TestDatabase::memory();

    let (keys, notified) = db
        .open_store(TEST_OBJECTS, |store| async move {
            let mut batch = store.insert(Value::from(numbered(&[1, 2, 3])));
            let keys = (&mut batch).await?;
            Ok((keys, batch.drain_progress()))
        })
        .await
        .unwrap();
    assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
    assert_eq!(notified, keys);
    assert_eq!(count(&db, TEST_OBJECTS).await, 3);

    let upserted = db
        .open_store(TEST_OBJECTS, |store| async move {
            store.upsert_many(numbered(&[3, 4])).await
        })
        .await
        .unwrap();
    assert_eq!(upserted.len(), 2);
    assert_eq!(count(&db, TEST_OBJECTS).await, 4);

    let empty = db
        .open_store(TEST_OBJECTS, |store| async move { store.insert(json!([])).await })
        .await
        .unwrap();
    assert!(empty.is_empty());
    assert_eq!(count(&db, TEST_OBJECTS).await, 4);
}

#[tokio::test]
async fn each_walks_in_both_directions_with_notifications() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[2, 1])).await;

    let (ascending, notified) = db
        .open_store(TEST_OBJECTS, |store| async move {
            let mut walk = store.each(&EachOptions::new());
            let values = (&mut walk).await?;
            Ok((values, walk.drain_progress()))
        })
        .await
        .unwrap();
    assert_eq!(ascending, numbered(&[1, 2]));
    assert_eq!(notified, numbered(&[1, 2]));

    let descending = db
        .open_store(TEST_OBJECTS, |store| async move {
            store
                .each(&EachOptions::new().direction(Direction::Descending))
                .await
        })
        .await
        .unwrap();
    assert_eq!(descending, numbered(&[2, 1]));

    let single = db
        .open_store(TEST_OBJECTS, |store| async move {
            store.each(&EachOptions::new().begin_key(1).end_key(1)).await
        })
        .await
        .unwrap();
    assert_eq!(single, numbered(&[1]));
}

#[tokio::test]
async fn each_by_follows_index_order() {
    let db = TestDatabase::memory();
    seed(
        &db,
        COMPLEX_TEST_OBJECTS,
        vec![
            json!({"id": 1, "name": "b"}),
            json!({"id": 2, "name": "a"}),
            json!({"id": 3, "name": "c"}),
        ],
    )
    .await;

    let ids = db
        .open_store(COMPLEX_TEST_OBJECTS, |store| async move {
            store.each_by(NAME_INDEX, &EachOptions::new()).await
        })
        .await
        .unwrap()
        .into_iter()
        .map(|record| record["id"].as_i64().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![2, 1, 3]);

    let found = db
        .open_store(COMPLEX_TEST_OBJECTS, |store| async move {
            store.find_by(NAME_INDEX, "c").await
        })
        .await
        .unwrap();
    assert_eq!(found, Some(json!({"id": 3, "name": "c"})));
}

#[tokio::test]
async fn range_queries_select_and_order_records() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[1, 2, 3, 4, 5])).await;

    let selected = db
        .open_store(TEST_OBJECTS, |store| async move {
            let mut query = store.query();
            query.between(2, 4).descending();
            store.find_where(&query).await
        })
        .await
        .unwrap();
    assert_eq!(selected, numbered(&[4, 3, 2]));

    let above = db
        .open_store(TEST_OBJECTS, |store| async move {
            let mut query = store.query();
            query.greater_than(3);
            store.each_where(&query).await
        })
        .await
        .unwrap();
    assert_eq!(above, numbered(&[4, 5]));
}

#[tokio::test]
async fn invalid_range_rejects_without_failing_the_transaction() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[1])).await;

    let result = db
        .open_store(TEST_OBJECTS, |store| async move {
            let mut query = store.query();
            query.between(5, 1);
            store.each_where(&query).await
        })
        .await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "The lower key is greater than the upper key."
    );
}

#[tokio::test]
async fn delete_and_clear_remove_records() {
    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[1, 2, 3])).await;

    db.open_store(TEST_OBJECTS, |store| async move {
        store.delete(2).await?;
        store.delete(42).await
    })
    .await
    .unwrap();
    assert_eq!(all(&db, TEST_OBJECTS).await, numbered(&[1, 3]));

    db.open_store(TEST_OBJECTS, |store| async move { store.clear().await })
        .await
        .unwrap();
    assert_eq!(count(&db, TEST_OBJECTS).await, 0);
}

#[tokio::test]
async fn bulk_reads_fall_back_to_cursors() {
    let factory = Factory::new(EngineConfig::new().bulk_reads(false));
    let db = TestDatabase::with_config(factory, test_config(unique_name("cursor")));
    seed(&db, TEST_OBJECTS, numbered(&[3, 1, 2])).await;

    let (keys, values) = db
        .open_store(TEST_OBJECTS, |store| async move {
            let keys = store.get_all_keys().await?;
            let values = store.get_all().await?;
            Ok((keys, values))
        })
        .await
        .unwrap();
    assert_eq!(keys, vec![Key::from(1), Key::from(2), Key::from(3)]);
    assert_eq!(values, numbered(&[1, 2, 3]));
}

#[tokio::test]
async fn find_as_deserializes_records() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    let db = TestDatabase::memory();
    seed(&db, TEST_OBJECTS, numbered(&[7])).await;

    let item: Item = db
        .open_store(TEST_OBJECTS, |store| store.find_as(7))
        .await
        .unwrap();
    assert_eq!(
        item,
        Item {
            id: 7,
            name: "item 7".to_string()
        }
    );

    let mismatched = db
        .open_store(TEST_OBJECTS, |store| store.find_as::<Vec<u8>>(7))
        .await;
    assert!(matches!(mismatched, Err(CoreError::Serialization { .. })));
}

#[tokio::test]
async fn writes_in_read_only_mode_abort_the_transaction() {
    let db = TestDatabase::memory();

    let result = db
        .open_store_with_mode(TEST_OBJECTS, AccessMode::ReadOnly, |store| async move {
            store.insert(json!({"id": 1})).await
        })
        .await;
    assert!(matches!(
        result,
        Err(CoreError::Transaction {
            failure: TransactionFailure::Aborted,
            ..
        })
    ));
    assert_eq!(count(&db, TEST_OBJECTS).await, 0);
}

#[tokio::test]
async fn invalid_record_aborts_the_whole_batch() {
    let db = TestDatabase::memory();

    let result = db
        .open_store(TEST_OBJECTS, |store| async move {
            let batch = store
                .insert(json!([{"id": 1, "name": "first"}, {"name": "no id"}]))
                .await;
            assert!(batch.is_err());
            // The transaction is already aborting, so later writes fail too.
            let late = store.insert(json!({"id": 2})).await;
            assert!(late.is_err());
            Ok(())
        })
        .await;

    assert!(matches!(
        result,
        Err(CoreError::Transaction {
            failure: TransactionFailure::Aborted,
            ..
        })
    ));
    assert_eq!(count(&db, TEST_OBJECTS).await, 0);
}

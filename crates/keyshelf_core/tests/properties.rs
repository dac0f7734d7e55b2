//! Property tests over random batches.

use keyshelf_core::{EachOptions, Key};
use keyshelf_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::Value;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn inserted_batches_read_back_in_key_order(batch in batch_strategy(12)) {
        let (keys, stored, count) = runtime().block_on(async {
            let db = TestDatabase::memory();
            let records = batch.clone();
            let keys = db
                .open_store(TEST_OBJECTS, |store| async move { store.insert_many(records).await })
                .await
                .unwrap();
            let (stored, count) = db
                .open_store(TEST_OBJECTS, |store| async move {
                    let stored = store.each(&EachOptions::new()).await?;
                    Ok((stored, store.count().await?))
                })
                .await
                .unwrap();
            (keys, stored, count)
        });

        prop_assert_eq!(keys.len(), batch.len());
        prop_assert_eq!(count as usize, batch.len());
        // Ids come from an ordered set, so the batch is already in key order.
        prop_assert_eq!(stored, batch);
    }

    #[test]
    fn upserting_twice_keeps_one_record_per_key(batch in batch_strategy(8)) {
        let count = runtime().block_on(async {
            let db = TestDatabase::memory();
            let first = batch.clone();
            let second = batch.clone();
            db.open_store(TEST_OBJECTS, |store| async move {
                store.upsert(Value::from(first)).await?;
                store.upsert(Value::from(second)).await
            })
            .await
            .unwrap();
            db.open_store(TEST_OBJECTS, |store| async move { store.count().await })
                .await
                .unwrap()
        });
        prop_assert_eq!(count as usize, batch.len());
    }

    #[test]
    fn keys_resolve_in_issue_order(batch in batch_strategy(10)) {
        let keys = runtime().block_on(async {
            let db = TestDatabase::memory();
            let records = batch.clone();
            db.open_store(TEST_OBJECTS, |store| async move { store.insert_many(records).await })
                .await
                .unwrap()
        });
        let expected: Vec<Key> = batch
            .iter()
            .map(|record| Key::from(record["id"].as_i64().unwrap()))
            .collect();
        prop_assert_eq!(keys, expected);
    }
}

//! Property-based test generators using proptest.
//!
//! Provides strategies for records and keys that fit the test schema.

use keyshelf_codec::Key;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Strategy for primitive keys: numbers and short strings.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (-1_000_000i64..1_000_000).prop_map(Key::from),
        prop::string::string_regex("[a-z0-9]{0,12}")
            .expect("Invalid regex")
            .prop_map(Key::from),
    ]
}

/// Strategy for record names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,15}").expect("Invalid regex")
}

/// Strategy for arbitrary JSON payload fields.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

/// Strategy for a record with the given integer `id`.
pub fn record_strategy(id: i64) -> impl Strategy<Value = Value> {
    (name_strategy(), payload_strategy())
        .prop_map(move |(name, payload)| json!({"id": id, "name": name, "payload": payload}))
}

/// Strategy for a batch of records with distinct integer ids.
pub fn batch_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(0i64..10_000, 0..=max).prop_flat_map(|ids: BTreeSet<i64>| {
        ids.into_iter()
            .map(record_strategy)
            .collect::<Vec<_>>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn batches_have_distinct_ids(batch in batch_strategy(16)) {
            let ids: BTreeSet<i64> = batch
                .iter()
                .map(|record| record["id"].as_i64().unwrap())
                .collect();
            prop_assert_eq!(ids.len(), batch.len());
        }

        #[test]
        fn keys_survive_json(key in key_strategy()) {
            prop_assert_eq!(Key::from_value(&key.to_value()), Some(key));
        }
    }
}

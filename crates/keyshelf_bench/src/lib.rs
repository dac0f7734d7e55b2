//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use keyshelf_codec::Key;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

/// Generate a random ASCII string of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate `count` records with ids `start..start + count` and a payload
/// of `payload_size` characters.
pub fn generate_records(start: usize, count: usize, payload_size: usize) -> Vec<Value> {
    (start..start + count)
        .map(|id| {
            json!({
                "id": id,
                "name": random_text(8),
                "payload": random_text(payload_size),
            })
        })
        .collect()
}

/// Generate `count` random keys, mixing numbers and strings.
pub fn generate_keys(count: usize) -> Vec<Key> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            if rng.gen_bool(0.5) {
                Key::from(rng.gen_range(-1_000_000i64..1_000_000))
            } else {
                Key::from(random_text(rng.gen_range(1..12)))
            }
        })
        .collect()
}

/// Build a multi-threaded runtime for async benchmarks.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

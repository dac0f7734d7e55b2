//! Schema descriptions.

use keyshelf_codec::KeyPath;
use serde::Serialize;

/// Description of a database and its stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Schema version of the open connection.
    pub version: u64,
    /// Every store, sorted by name.
    pub object_stores: Vec<StoreInfo>,
}

/// Description of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    /// Store name.
    pub name: String,
    /// Key path, `None` for out-of-line keys.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys.
    pub auto_increment: bool,
    /// Index names, sorted.
    pub indices: Vec<String>,
}

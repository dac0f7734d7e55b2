//! # KeyShelf Core
//!
//! Future-based transactional data access over KeyShelf object stores.
//!
//! This crate wraps the callback-driven [`engine`] in a uniform async API:
//! - [`Database`] manages one lazily opened connection, runs schema
//!   upgrades and opens transactions over one, several or all stores
//! - [`Collection`] reads and writes one store inside a transaction
//! - [`RangeQuery`] composes key ranges and directions for cursor walks
//! - [`Database::flush`] waits for every transaction still in flight
//!
//! ## Promises
//!
//! Collection operations issue their engine requests immediately and
//! return a [`Promise`]. Awaiting it yields the result; batch writes and
//! cursor walks also report each item through [`Promise::progress`].
//!
//! ## Transactions
//!
//! The stores passed to an `open_*` callback belong to one transaction,
//! which commits once the callback's future has finished and dropped them.
//! The first failing request aborts the transaction and the whole call
//! fails with [`CoreError::Transaction`].
//!
//! ```no_run
//! use keyshelf_core::engine::{Factory, ObjectStoreParameters};
//! use keyshelf_core::{Database, DatabaseConfig, EachOptions};
//! use serde_json::json;
//!
//! # async fn demo() -> keyshelf_core::CoreResult<()> {
//! let config = DatabaseConfig::new("app").upgrade(1, |_, _, transaction| {
//!     transaction.create_object_store("people", ObjectStoreParameters::new().key_path("id"))?;
//!     Ok(())
//! })?;
//! let database = Database::new(Factory::in_memory(), config);
//!
//! let people = database
//!     .open_store("people", |people| async move {
//!         people.insert(json!([{"id": 1}, {"id": 2}])).await?;
//!         people.each(&EachOptions::new()).await
//!     })
//!     .await?;
//! assert_eq!(people.len(), 2);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod cursor;
mod database;
mod deferred;
mod error;
mod info;
mod migration;
mod query;
mod transaction;
mod translate;

pub use keyshelf_codec::{Key, KeyPath, KeyRange};
pub use keyshelf_engine as engine;

pub use collection::Collection;
pub use config::{AccessMode, DatabaseConfig};
pub use database::{ConnectionState, Database};
pub use deferred::{Deferred, Promise};
pub use error::{CoreError, CoreResult, TransactionFailure};
pub use info::{DatabaseInfo, StoreInfo};
pub use migration::{SchemaVersion, UpgradeRegistry, UpgradeStep};
pub use query::{Direction, EachOptions, QueryDirection, RangeQuery, QUERY_DIRECTION};
pub use transaction::{Completion, Transaction, TransactionOutcome, TRANSACTION_COMPLETED};
pub use translate::{error_message_for, OPERATION_PENDING};

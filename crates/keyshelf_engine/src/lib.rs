//! # KeyShelf Engine
//!
//! Embedded, versioned object-store engine with callback-driven requests.
//!
//! This crate provides:
//! - [`Factory`] to open, upgrade and delete named databases
//! - [`Connection`] and native [`Transaction`]s over a set of object stores
//! - [`ObjectStore`], [`Index`] and [`Cursor`] handles whose operations
//!   return a [`Request`]
//! - Snapshot persistence through the [`SnapshotStore`] trait
//!
//! ## Requests and Transactions
//!
//! Every operation validates synchronously and returns either an error or
//! a [`Request`]. Results arrive later through the request's handlers,
//! which run on the transaction's worker task. A transaction commits once
//! every handle to it has been dropped and its queued requests have
//! finished; the first failing request aborts it.
//!
//! ```no_run
//! use keyshelf_engine::{Factory, ObjectStoreParameters, TransactionMode, UpgradeEvent};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), keyshelf_engine::DomError> {
//! let factory = Factory::in_memory();
//! let open = factory.open("notes", Some(1))?;
//! open.on_upgrade_needed(|event: UpgradeEvent| {
//!     let params = ObjectStoreParameters::new().key_path("id");
//!     let _ = event.transaction.create_object_store("notes", params);
//! });
//! open.on_success(|connection| {
//!     if let Ok(txn) = connection.transaction(["notes"], TransactionMode::ReadWrite) {
//!         if let Ok(store) = txn.object_store("notes") {
//!             let _ = store.put(json!({"id": 1, "text": "hello"}), None);
//!         }
//!     }
//! });
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod connection;
mod cursor;
mod database;
mod error;
mod event;
mod factory;
mod index;
mod request;
mod state;
mod store;
mod transaction;

pub use backend::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use config::EngineConfig;
pub use connection::Connection;
pub use cursor::{Cursor, CursorDirection};
pub use error::{DomError, EngineResult, ErrorName, StorageError, StorageResult};
pub use event::{ErrorEvent, ReadyState};
pub use factory::Factory;
pub use index::{Index, IndexParameters};
pub use request::{OpenRequest, Request, UpgradeEvent};
pub use store::ObjectStore;
pub use transaction::{ObjectStoreParameters, Transaction, TransactionMode};

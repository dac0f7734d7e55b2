//! # KeyShelf Testkit
//!
//! Test utilities for KeyShelf.
//!
//! This crate provides:
//! - The shared test schema and self-cleaning test databases
//! - Property-based test generators using proptest
//! - One-time tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keyshelf_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_database() {
//!     let db = TestDatabase::memory();
//!     db.open_store(TEST_OBJECTS, |store| async move { store.count().await })
//!         .await
//!         .unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

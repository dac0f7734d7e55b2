//! # KeyShelf Codec
//!
//! Key model and encoding helpers for KeyShelf.
//!
//! This crate provides:
//! - [`Key`], the ordered key type used for primary keys and index entries
//! - [`KeyPath`], which extracts keys from (and injects keys into) JSON records
//! - [`KeyRange`], an interval over keys with open or closed bounds
//! - CBOR snapshot encoding used by persistent engine backends
//!
//! ## Key Order
//!
//! Keys of different types never compare equal. Every number sorts before
//! every string, strings before binary keys, binary keys before arrays:
//!
//! ```
//! use keyshelf_codec::Key;
//!
//! assert!(Key::from(10) < Key::from("a"));
//! assert!(Key::from("z") < Key::binary(vec![0]));
//! assert!(Key::binary(vec![255]) < Key::from(vec![Key::from(0)]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod key;
mod key_path;
mod range;
mod snapshot;

pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use key_path::KeyPath;
pub use range::KeyRange;
pub use snapshot::{from_cbor, to_cbor};

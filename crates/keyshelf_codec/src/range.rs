//! Key ranges.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use std::ops::Bound;

/// An interval over keys.
///
/// Either bound may be absent (unbounded) and each present bound is
/// independently open (exclusive) or closed (inclusive).
///
/// ```
/// use keyshelf_codec::{Key, KeyRange};
///
/// let range = KeyRange::bound(Key::from(1), Key::from(5), false, true).unwrap();
/// assert!(range.includes(&Key::from(1)));
/// assert!(!range.includes(&Key::from(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range matching exactly one key.
    #[must_use]
    pub fn only(key: Key) -> Self {
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// A range with only a lower bound.
    #[must_use]
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Some(key),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// A range with only an upper bound.
    #[must_use]
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(key),
            lower_open: false,
            upper_open: open,
        }
    }

    /// A range with both bounds.
    ///
    /// # Errors
    ///
    /// Fails if `lower > upper`, or if they are equal and either side is
    /// open (the range would be empty).
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> CodecResult<Self> {
        if lower > upper {
            return Err(CodecError::invalid_range(
                "The lower key is greater than the upper key.",
            ));
        }
        if lower == upper && (lower_open || upper_open) {
            return Err(CodecError::invalid_range(
                "The lower key and upper key are equal and one of the bounds is open.",
            ));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Returns the lower bound key.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Returns the upper bound key.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound is exclusive.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound is exclusive.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Returns true if `key` lies inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
        };
        above_lower && below_upper
    }

    /// Returns the range as a pair of standard library bounds, suitable
    /// for `BTreeMap::range`.
    #[must_use]
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (
            to_bound(self.lower.as_ref(), self.lower_open),
            to_bound(self.upper.as_ref(), self.upper_open),
        )
    }
}

fn to_bound(key: Option<&Key>, open: bool) -> Bound<&Key> {
    match key {
        None => Bound::Unbounded,
        Some(key) if open => Bound::Excluded(key),
        Some(key) => Bound::Included(key),
    }
}

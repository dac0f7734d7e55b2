//! Range queries over stores and indexes.

use crate::error::CoreResult;
use keyshelf_codec::{Key, KeyRange};
use keyshelf_engine::CursorDirection;

/// Iteration direction for [`EachOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Ascending,
    /// Descending key order.
    Descending,
}

impl From<Direction> for CursorDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Ascending => CursorDirection::Next,
            Direction::Descending => CursorDirection::Prev,
        }
    }
}

/// The pair of directions exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDirection {
    /// Ascending key order.
    pub ascending: Direction,
    /// Descending key order.
    pub descending: Direction,
}

/// Direction constants, as returned by `Database::query_direction`.
pub const QUERY_DIRECTION: QueryDirection = QueryDirection {
    ascending: Direction::Ascending,
    descending: Direction::Descending,
};

#[derive(Debug, Clone, PartialEq)]
enum Bounds {
    All,
    Only(Key),
    Lower { key: Key, open: bool },
    Upper { key: Key, open: bool },
    Between {
        lower: Key,
        upper: Key,
        lower_open: bool,
        upper_open: bool,
    },
}

/// A single-range query, optionally through a secondary index.
///
/// Operators mutate the query in place and return it for chaining. Every
/// bound operator replaces the whole range; the last one wins. The default
/// is an ascending, non-unique scan over every primary key.
///
/// ```
/// use keyshelf_core::RangeQuery;
///
/// let mut query = RangeQuery::new();
/// query.by_index("name").between("a", "m").descending();
/// assert_eq!(query.index_name(), Some("name"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    index_name: Option<String>,
    bounds: Bounds,
    direction: CursorDirection,
}

impl Default for RangeQuery {
    fn default() -> Self {
        Self {
            index_name: None,
            bounds: Bounds::All,
            direction: CursorDirection::Next,
        }
    }
}

impl RangeQuery {
    /// Creates a full-range ascending query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys strictly below `value`.
    pub fn less_than(&mut self, value: impl Into<Key>) -> &mut Self {
        self.bounds = Bounds::Upper {
            key: value.into(),
            open: true,
        };
        self
    }

    /// Keys strictly above `value`.
    pub fn greater_than(&mut self, value: impl Into<Key>) -> &mut Self {
        self.bounds = Bounds::Lower {
            key: value.into(),
            open: true,
        };
        self
    }

    /// Keys at or below `value`.
    pub fn less_or_equal(&mut self, value: impl Into<Key>) -> &mut Self {
        self.bounds = Bounds::Upper {
            key: value.into(),
            open: false,
        };
        self
    }

    /// Keys at or above `value`.
    pub fn greater_or_equal(&mut self, value: impl Into<Key>) -> &mut Self {
        self.bounds = Bounds::Lower {
            key: value.into(),
            open: false,
        };
        self
    }

    /// Exactly `value`.
    pub fn equals(&mut self, value: impl Into<Key>) -> &mut Self {
        self.bounds = Bounds::Only(value.into());
        self
    }

    /// Keys between `lower` and `upper`, both inclusive.
    pub fn between(&mut self, lower: impl Into<Key>, upper: impl Into<Key>) -> &mut Self {
        self.between_with(lower, upper, false, false)
    }

    /// Keys between `lower` and `upper`, each side independently exclusive.
    pub fn between_with(
        &mut self,
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        exclude_lower: bool,
        exclude_upper: bool,
    ) -> &mut Self {
        self.bounds = Bounds::Between {
            lower: lower.into(),
            upper: upper.into(),
            lower_open: exclude_lower,
            upper_open: exclude_upper,
        };
        self
    }

    /// Iterates in descending order.
    pub fn descending(&mut self) -> &mut Self {
        self.direction = CursorDirection::Prev;
        self
    }

    /// Iterates in descending order, visiting each index key once.
    pub fn descending_unique(&mut self) -> &mut Self {
        self.direction = CursorDirection::PrevUnique;
        self
    }

    /// Iterates in ascending order.
    pub fn ascending(&mut self) -> &mut Self {
        self.direction = CursorDirection::Next;
        self
    }

    /// Iterates in ascending order, visiting each index key once.
    pub fn ascending_unique(&mut self) -> &mut Self {
        self.direction = CursorDirection::NextUnique;
        self
    }

    /// Iterates the named secondary index instead of primary keys.
    pub fn by_index(&mut self, name: impl Into<String>) -> &mut Self {
        self.index_name = Some(name.into());
        self
    }

    /// Returns the index to iterate, if any.
    #[must_use]
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Returns the cursor direction.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    /// Builds the key range, `None` meaning unbounded.
    ///
    /// # Errors
    ///
    /// Fails when the lower bound is above the upper bound, or when they
    /// are equal and either side is exclusive.
    pub fn key_range(&self) -> CoreResult<Option<KeyRange>> {
        let range = match &self.bounds {
            Bounds::All => return Ok(None),
            Bounds::Only(key) => KeyRange::only(key.clone()),
            Bounds::Lower { key, open } => KeyRange::lower_bound(key.clone(), *open),
            Bounds::Upper { key, open } => KeyRange::upper_bound(key.clone(), *open),
            Bounds::Between {
                lower,
                upper,
                lower_open,
                upper_open,
            } => KeyRange::bound(lower.clone(), upper.clone(), *lower_open, *upper_open)?,
        };
        Ok(Some(range))
    }
}

/// Shorthand options for `Collection::each` and `Collection::each_by`.
///
/// When both keys are present the iteration covers the inclusive range
/// between them; otherwise it is unbounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EachOptions {
    /// First key to visit.
    pub begin_key: Option<Key>,
    /// Last key to visit.
    pub end_key: Option<Key>,
    /// Iteration direction.
    pub direction: Direction,
}

impl EachOptions {
    /// Creates options for an unbounded ascending iteration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the first key.
    #[must_use]
    pub fn begin_key(mut self, key: impl Into<Key>) -> Self {
        self.begin_key = Some(key.into());
        self
    }

    /// Sets the last key.
    #[must_use]
    pub fn end_key(mut self, key: impl Into<Key>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    /// Sets the direction.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Converts the options into a query over `index`, or over primary
    /// keys for `None`.
    #[must_use]
    pub fn to_query(&self, index: Option<&str>) -> RangeQuery {
        let mut query = RangeQuery::new();
        if let Some(index) = index {
            query.by_index(index);
        }
        if let (Some(begin), Some(end)) = (&self.begin_key, &self.end_key) {
            query.between(begin.clone(), end.clone());
        }
        if self.direction == Direction::Descending {
            query.descending();
        }
        query
    }
}

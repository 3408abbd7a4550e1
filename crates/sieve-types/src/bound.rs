//! Sort specifications and per-shard sort bounds.
//!
//! A shard answering a can-match probe may report the min and max value of
//! the request's primary sort field. Those bounds are what lets the
//! coordinator visit the most promising shards first.
//!
//! A [`Bound`] is a tagged union: both ends always share one value kind.
//! Comparing two bounds of different kinds (for instance a numeric field on
//! one index and a keyword field with the same name on another) is not an
//! error. [`Bound::compare`] simply returns `None` and the caller decides
//! how to fall back.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sort direction of the primary sort field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest values first.
    #[default]
    Asc,
    /// Largest values first.
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

/// The primary sort of a search request: one field and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field the request sorts on.
    pub field: String,
    /// Sort direction.
    pub order: SortOrder,
}

impl SortSpec {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Value kind carried by a [`Bound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    /// 64-bit integers (also dates as epoch millis).
    Long,
    /// 64-bit floats.
    Double,
    /// UTF-8 terms, compared bytewise.
    Text,
}

/// Min and max of the sort field on one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bound {
    /// Integer range.
    Long {
        /// Smallest value on the shard.
        min: i64,
        /// Largest value on the shard.
        max: i64,
    },
    /// Floating point range.
    Double {
        /// Smallest value on the shard.
        min: f64,
        /// Largest value on the shard.
        max: f64,
    },
    /// Term range.
    Text {
        /// Smallest term on the shard.
        min: String,
        /// Largest term on the shard.
        max: String,
    },
}

impl Bound {
    /// Integer bound. `min` must not exceed `max`.
    pub fn long(min: i64, max: i64) -> Self {
        debug_assert!(min <= max, "bound min {min} exceeds max {max}");
        Bound::Long { min, max }
    }

    /// Floating point bound. `min` must not exceed `max`.
    pub fn double(min: f64, max: f64) -> Self {
        debug_assert!(min.total_cmp(&max).is_le(), "bound min {min} exceeds max {max}");
        Bound::Double { min, max }
    }

    /// Term bound. `min` must not sort after `max`.
    pub fn text(min: impl Into<String>, max: impl Into<String>) -> Self {
        let (min, max) = (min.into(), max.into());
        debug_assert!(min <= max, "bound min {min:?} exceeds max {max:?}");
        Bound::Text { min, max }
    }

    /// The value kind of both ends.
    pub fn kind(&self) -> BoundKind {
        match self {
            Bound::Long { .. } => BoundKind::Long,
            Bound::Double { .. } => BoundKind::Double,
            Bound::Text { .. } => BoundKind::Text,
        }
    }

    /// Compare two bounds for the given direction.
    ///
    /// Ascending compares minimums; descending compares maximums with the
    /// largest first. Returns `None` when the kinds differ.
    pub fn compare(&self, other: &Bound, order: SortOrder) -> Option<Ordering> {
        let ordering = match (self, other) {
            (Bound::Long { min: a, .. }, Bound::Long { min: b, .. }) if order == SortOrder::Asc => {
                a.cmp(b)
            }
            (Bound::Long { max: a, .. }, Bound::Long { max: b, .. }) => b.cmp(a),
            (Bound::Double { min: a, .. }, Bound::Double { min: b, .. })
                if order == SortOrder::Asc =>
            {
                a.total_cmp(b)
            }
            (Bound::Double { max: a, .. }, Bound::Double { max: b, .. }) => b.total_cmp(a),
            (Bound::Text { min: a, .. }, Bound::Text { min: b, .. }) if order == SortOrder::Asc => {
                a.cmp(b)
            }
            (Bound::Text { max: a, .. }, Bound::Text { max: b, .. }) => b.cmp(a),
            _ => return None,
        };
        Some(ordering)
    }
}

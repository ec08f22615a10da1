//! Subject identifiers: ordering, composite keys and bucket routing.
//!
//! Sorted input is ordered by `(subset, identifier)`. Identifiers use a length-first
//! comparison so that numeric-looking identifiers sort numerically (`"9" < "10"`), while
//! equal-length identifiers fall back to ordinal string comparison. Subset tags compare
//! ordinally, and a missing subset sorts before any present one.
//!
//! # Examples
//!
//! ```
//! use cohortbeam::ident::compare_ids;
//! use std::cmp::Ordering;
//!
//! assert_eq!(compare_ids("9", "10"), Ordering::Less);
//! assert_eq!(compare_ids("ab", "aa"), Ordering::Greater);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Length-first ordinal comparison of two identifiers.
///
/// Length is counted in characters, not UTF-8 bytes, so `"é" < "ab"`.
#[inline]
#[must_use]
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let by_len = if a.is_ascii() && b.is_ascii() {
        a.len().cmp(&b.len())
    } else {
        a.chars().count().cmp(&b.chars().count())
    };
    by_len.then_with(|| a.cmp(b))
}

/// Rotating hash over the characters of `s`.
///
/// Each step shifts the accumulator left by five, folds the top five bits back in and
/// XORs the next character code. Deterministic for a given string; not cryptographic.
#[must_use]
pub fn rotating_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = (h << 5) ^ ((h as u32) >> 27) as i32 ^ (c as i32);
    }
    h
}

/// Map `s` onto a bucket in `[0, buckets)`.
#[must_use]
pub fn route(s: &str, buckets: usize) -> usize {
    let buckets = buckets.max(1);
    (rotating_hash(s).unsigned_abs() as usize) % buckets
}

/// The `(subset, identifier)` pair that ties dependent records to a subject.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    pub subset: Option<String>,
    pub id: String,
}

impl SubjectKey {
    pub fn new(subset: Option<String>, id: impl Into<String>) -> Self {
        Self {
            subset: subset.filter(|s| !s.is_empty()),
            id: id.into(),
        }
    }

    /// Key without a subset tag.
    pub fn plain(id: impl Into<String>) -> Self {
        Self::new(None, id)
    }

    /// Single-string form used by the hash join: `"subset_id"`, or just `"id"`.
    #[must_use]
    pub fn composite(&self) -> String {
        match &self.subset {
            Some(subset) => format!("{subset}_{}", self.id),
            None => self.id.clone(),
        }
    }

    /// Bucket this key is routed to when the input is split into `buckets` partitions.
    #[must_use]
    pub fn bucket(&self, buckets: usize) -> usize {
        route(&self.composite(), buckets)
    }
}

impl PartialOrd for SubjectKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubjectKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.subset
            .cmp(&other.subset)
            .then_with(|| compare_ids(&self.id, &other.id))
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subset {
            Some(subset) => write!(f, "{} (subset {subset})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

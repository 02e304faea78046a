//! Per-table progress watermarks.
//!
//! A watermark is the timestamp below which every change of a table is known
//! to be applied to the index. Tables never seen before start at the Unix
//! epoch.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Watermark of a table that has never been synced.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Mapping from table name to the watermark of its last applied change.
///
/// Passed by value between the checkpoint store and the sync engine; there is
/// no process-global "last sync time".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks(BTreeMap<String, DateTime<Utc>>);

impl Watermarks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapping holding a single table's watermark.
    #[must_use]
    pub fn single(table: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut marks = Self::new();
        marks.set(table, at);
        marks
    }

    /// Watermark for `table`, or [`EPOCH`] if it has none.
    #[must_use]
    pub fn get(&self, table: &str) -> DateTime<Utc> {
        self.0.get(table).copied().unwrap_or(EPOCH)
    }

    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.0.contains_key(table)
    }

    /// Overwrites the watermark for `table`.
    pub fn set(&mut self, table: impl Into<String>, at: DateTime<Utc>) {
        self.0.insert(table.into(), at);
    }

    /// Moves `table` forward to `at`, never backwards. Returns the resulting
    /// watermark.
    pub fn advance(&mut self, table: &str, at: DateTime<Utc>) -> DateTime<Utc> {
        let next = self.get(table).max(at);
        self.0.insert(table.to_string(), next);
        next
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.0.iter().map(|(table, at)| (table.as_str(), *at))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, DateTime<Utc>)> for Watermarks {
    fn from_iter<I: IntoIterator<Item = (String, DateTime<Utc>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Encodes a watermark as RFC 3339 text with microsecond precision.
#[must_use]
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a watermark written by [`encode_timestamp`].
///
/// # Errors
///
/// Returns the parse error if `text` is not RFC 3339.
pub fn decode_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|at| at.with_timezone(&Utc))
}

//! Field-kind inference for change batches.
//!
//! The field schema of a batch is derived from the field *names* of its first
//! row. Only the two reserved names of a table are tagged specially; every
//! other field is [`FieldKind::Plain`]. A reserved field that is absent from
//! the sample row is not tagged, so rows of the same batch that carry it are
//! indexed as plain values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ChangedRow, Row};

/// How a field is transformed before indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Geographic coordinate, emitted as `{"lat", "lon"}`.
    GeoPoint,
    /// Structured sub-document.
    NestedObject,
    /// Scalar or text value, passed through unchanged.
    Plain,
}

/// The two field names a table treats specially.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservedFields<'a> {
    pub geo: Option<&'a str>,
    pub nested: Option<&'a str>,
}

/// Field name to [`FieldKind`] for one change batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchemaMap(BTreeMap<String, FieldKind>);

impl FieldSchemaMap {
    /// Kind of `field`; fields outside the map are [`FieldKind::Plain`].
    #[must_use]
    pub fn kind(&self, field: &str) -> FieldKind {
        self.0.get(field).copied().unwrap_or(FieldKind::Plain)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.0.iter().map(|(name, kind)| (name.as_str(), *kind))
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

/// Infers the field schema from a representative row.
///
/// Deterministic in the row's field names. If the same name is reserved for
/// both kinds, geo wins.
#[must_use]
pub fn infer(sample: &Row, reserved: &ReservedFields<'_>) -> FieldSchemaMap {
    let fields = sample
        .keys()
        .map(|name| {
            let kind = if reserved.geo == Some(name.as_str()) {
                FieldKind::GeoPoint
            } else if reserved.nested == Some(name.as_str()) {
                FieldKind::NestedObject
            } else {
                FieldKind::Plain
            };
            (name.clone(), kind)
        })
        .collect();
    FieldSchemaMap(fields)
}

/// Infers from the first row of a batch; an empty batch yields an empty map.
#[must_use]
pub fn infer_batch(batch: &[ChangedRow], reserved: &ReservedFields<'_>) -> FieldSchemaMap {
    batch
        .first()
        .map(|row| infer(&row.fields, reserved))
        .unwrap_or_default()
}

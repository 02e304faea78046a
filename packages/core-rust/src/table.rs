//! Per-table synchronization settings.

use serde::{Deserialize, Serialize};

use crate::schema::ReservedFields;

/// Field name treated as a geographic coordinate unless configured otherwise.
pub const DEFAULT_GEO_FIELD: &str = "location";

/// Field name treated as a structured sub-document unless configured otherwise.
pub const DEFAULT_NESTED_FIELD: &str = "attributes";

/// Identifies one logical table to synchronize and the columns that drive
/// change detection.
///
/// Immutable for the lifetime of the process. Deserializes from the JSON
/// table-config file, where everything except `name` is optional:
///
/// ```json
/// { "name": "player", "primary_key": "id", "geo_field": null }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSyncSpec {
    /// Source table name. May be schema-qualified (`public.player`).
    pub name: String,
    /// Target index name. Defaults to the table name.
    #[serde(default)]
    pub index: Option<String>,
    /// Primary-key column; its value becomes the document id.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Soft-delete marker column, a nullable timestamp.
    #[serde(default = "default_soft_delete_field")]
    pub soft_delete_field: String,
    /// Last-modified timestamp column.
    #[serde(default = "default_modified_field")]
    pub modified_field: String,
    /// Column normalized into a `geo_point`. `None` disables geo handling.
    #[serde(default = "default_geo_field")]
    pub geo_field: Option<String>,
    /// Column passed through as a structured object. `None` disables it.
    #[serde(default = "default_nested_field")]
    pub nested_field: Option<String>,
}

impl TableSyncSpec {
    /// Creates a spec for `name` with the default column names.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            primary_key: default_primary_key(),
            soft_delete_field: default_soft_delete_field(),
            modified_field: default_modified_field(),
            geo_field: default_geo_field(),
            nested_field: default_nested_field(),
        }
    }

    /// Name of the index this table's documents are written to.
    #[must_use]
    pub fn index_name(&self) -> &str {
        self.index.as_deref().unwrap_or(&self.name)
    }

    /// Field names that schema inference tags specially for this table.
    #[must_use]
    pub fn reserved_fields(&self) -> ReservedFields<'_> {
        ReservedFields {
            geo: self.geo_field.as_deref(),
            nested: self.nested_field.as_deref(),
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_soft_delete_field() -> String {
    "deleted_at".to_string()
}

fn default_modified_field() -> String {
    "updated_at".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_geo_field() -> Option<String> {
    Some(DEFAULT_GEO_FIELD.to_string())
}

#[allow(clippy::unnecessary_wraps)]
fn default_nested_field() -> Option<String> {
    Some(DEFAULT_NESTED_FIELD.to_string())
}

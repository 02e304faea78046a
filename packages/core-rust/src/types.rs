use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One source row as an ordered JSON object of column name to value.
pub type Row = serde_json::Map<String, Value>;

/// A created or modified row, not soft-deleted, read in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRow {
    /// Value of the table's last-modified column.
    pub modified_at: DateTime<Utc>,
    /// All columns of the row.
    pub fields: Row,
}

/// A soft-deleted row: only its identity and the time it was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRow {
    /// Primary-key value rendered as a document id.
    pub id: String,
    /// Value of the soft-delete marker column.
    pub deleted_at: DateTime<Utc>,
}

/// A normalized row ready to be written to the index.
///
/// Created by [`normalize`](crate::normalize::normalize) and consumed by a
/// single upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identity, taken verbatim from the primary-key value.
    pub id: String,
    /// Indexed fields, the primary key included.
    pub body: Row,
}

/// Renders a primary-key value as a document id.
///
/// Strings are used as-is, numbers and booleans in their JSON text form.
/// `null` has no identity and yields `None`. Composite values fall back to
/// their compact JSON encoding.
#[must_use]
pub fn document_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn document_id_keeps_strings_verbatim() {
        assert_eq!(document_id(&json!("abc-1")), Some("abc-1".to_string()));
        assert_eq!(document_id(&json!("")), Some(String::new()));
    }

    #[test]
    fn document_id_renders_numbers() {
        assert_eq!(document_id(&json!(42)), Some("42".to_string()));
        assert_eq!(document_id(&json!(-7)), Some("-7".to_string()));
    }

    #[test]
    fn document_id_rejects_null() {
        assert_eq!(document_id(&Value::Null), None);
    }

    #[test]
    fn document_id_encodes_composites() {
        assert_eq!(document_id(&json!([1, 2])), Some("[1,2]".to_string()));
    }
}

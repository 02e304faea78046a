//! Row to document normalization.
//!
//! Pure transformation, total over well-formed rows. Values that do not match
//! the shape their field kind expects are passed through unchanged: the source
//! store owns validation, and the index decides what it accepts.

use serde_json::{json, Value};
use tracing::debug;

use crate::schema::{FieldKind, FieldSchemaMap};
use crate::types::{document_id, Document, Row};

/// Reasons a row cannot become a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("row has no value for primary key `{field}`")]
    MissingPrimaryKey { field: String },
}

/// Converts a source row into an index document.
///
/// # Errors
///
/// Returns [`NormalizeError::MissingPrimaryKey`] if the primary-key column is
/// absent or `null`.
pub fn normalize(
    row: &Row,
    primary_key: &str,
    schema: &FieldSchemaMap,
) -> Result<Document, NormalizeError> {
    let id = row
        .get(primary_key)
        .and_then(document_id)
        .ok_or_else(|| NormalizeError::MissingPrimaryKey {
            field: primary_key.to_string(),
        })?;

    let body = row
        .iter()
        .map(|(name, value)| {
            let value = match schema.kind(name) {
                FieldKind::GeoPoint => geo_point(value).unwrap_or_else(|| {
                    if !value.is_null() {
                        debug!(field = %name, %id, "geo value not recognised, passing through");
                    }
                    value.clone()
                }),
                FieldKind::NestedObject => nested_object(value),
                FieldKind::Plain => value.clone(),
            };
            (name.clone(), value)
        })
        .collect();

    Ok(Document { id, body })
}

/// Recognises the coordinate encodings the source is known to produce and
/// emits the index's `{"lat", "lon"}` form.
///
/// Accepted inputs:
/// - objects with `lat`/`lon`, `lat`/`lng`, `latitude`/`longitude`, or `x`/`y`
///   (x is longitude)
/// - PostgreSQL `point` text `"(x,y)"` (x is longitude)
/// - `"lat,lon"` text
/// - `[lon, lat]` arrays
fn geo_point(value: &Value) -> Option<Value> {
    let (lat, lon) = match value {
        Value::Object(map) => {
            let pick = |a: &str, b: &str| Some((number(map.get(a)?)?, number(map.get(b)?)?));
            pick("lat", "lon")
                .or_else(|| pick("lat", "lng"))
                .or_else(|| pick("latitude", "longitude"))
                .or_else(|| pick("y", "x"))?
        }
        Value::String(text) => {
            let text = text.trim();
            if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                let (x, y) = pair(inner)?;
                (y, x)
            } else {
                pair(text)?
            }
        }
        Value::Array(items) if items.len() == 2 => (number(&items[1])?, number(&items[0])?),
        _ => return None,
    };

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(json!({ "lat": lat, "lon": lon }))
}

fn pair(text: &str) -> Option<(f64, f64)> {
    let (a, b) = text.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Structured values pass through; JSON text holding an object or array is
/// parsed into its structure.
fn nested_object(value: &Value) -> Value {
    if let Value::String(text) = value {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                return parsed;
            }
        }
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::schema::{infer, ReservedFields};

    const RESERVED: ReservedFields<'static> = ReservedFields {
        geo: Some("location"),
        nested: Some("attributes"),
    };

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("test rows must be objects"),
        }
    }

    fn normalize_one(value: Value) -> Document {
        let row = row(value);
        let schema = infer(&row, &RESERVED);
        normalize(&row, "id", &schema).unwrap()
    }

    #[test]
    fn keeps_primary_key_verbatim() {
        let doc = normalize_one(json!({"id": 17, "name": "Bunyodkor"}));
        assert_eq!(doc.id, "17");
        assert_eq!(doc.body["id"], json!(17));
        assert_eq!(doc.body["name"], json!("Bunyodkor"));
    }

    #[test]
    fn missing_primary_key_is_an_error() {
        let row = row(json!({"name": "x"}));
        let err = normalize(&row, "id", &FieldSchemaMap::default()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingPrimaryKey {
                field: "id".to_string()
            }
        );

        let null_key = self::row(json!({"id": null}));
        assert!(normalize(&null_key, "id", &FieldSchemaMap::default()).is_err());
    }

    #[test]
    fn geo_from_lat_lon_object() {
        let doc = normalize_one(json!({"id": 1, "location": {"lat": 41.3, "lon": 69.2}}));
        assert_eq!(doc.body["location"], json!({"lat": 41.3, "lon": 69.2}));
    }

    #[test]
    fn geo_from_latitude_longitude_object() {
        let doc = normalize_one(json!({"id": 1, "location": {"latitude": "41.3", "longitude": 69.2}}));
        assert_eq!(doc.body["location"], json!({"lat": 41.3, "lon": 69.2}));
    }

    #[test]
    fn geo_from_postgres_point_text() {
        let doc = normalize_one(json!({"id": 1, "location": "(69.2,41.3)"}));
        assert_eq!(doc.body["location"], json!({"lat": 41.3, "lon": 69.2}));
    }

    #[test]
    fn geo_from_lat_lon_text() {
        let doc = normalize_one(json!({"id": 1, "location": "41.3, 69.2"}));
        assert_eq!(doc.body["location"], json!({"lat": 41.3, "lon": 69.2}));
    }

    #[test]
    fn geo_from_lon_lat_array() {
        let doc = normalize_one(json!({"id": 1, "location": [69.2, 41.3]}));
        assert_eq!(doc.body["location"], json!({"lat": 41.3, "lon": 69.2}));
    }

    #[test]
    fn malformed_geo_passes_through() {
        let doc = normalize_one(json!({"id": 1, "location": "somewhere"}));
        assert_eq!(doc.body["location"], json!("somewhere"));

        let out_of_range = normalize_one(json!({"id": 1, "location": {"lat": 200.0, "lon": 0.0}}));
        assert_eq!(out_of_range.body["location"], json!({"lat": 200.0, "lon": 0.0}));

        let null = normalize_one(json!({"id": 1, "location": null}));
        assert_eq!(null.body["location"], Value::Null);
    }

    #[test]
    fn nested_object_passes_through() {
        let doc = normalize_one(json!({"id": 1, "attributes": {"founded": 1956, "tags": ["a"]}}));
        assert_eq!(doc.body["attributes"], json!({"founded": 1956, "tags": ["a"]}));
    }

    #[test]
    fn nested_object_parses_json_text() {
        let doc = normalize_one(json!({"id": 1, "attributes": "{\"founded\": 1956}"}));
        assert_eq!(doc.body["attributes"], json!({"founded": 1956}));
    }

    #[test]
    fn nested_non_json_text_passes_through() {
        let doc = normalize_one(json!({"id": 1, "attributes": "{not json"}));
        assert_eq!(doc.body["attributes"], json!("{not json"));
    }

    #[test]
    fn plain_fields_are_untouched() {
        let doc = normalize_one(json!({"id": 1, "name": "(1,2)", "score": [1, 2]}));
        assert_eq!(doc.body["name"], json!("(1,2)"));
        assert_eq!(doc.body["score"], json!([1, 2]));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let first = normalize_one(json!({"id": 1, "location": "(69.2,41.3)"}));
        let schema = infer(&first.body, &RESERVED);
        let second = normalize(&first.body, "id", &schema).unwrap();
        assert_eq!(first, second);
    }

    fn field_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
            ".{0,12}".prop_map(Value::String),
            (-180.0f64..180.0, -90.0f64..90.0).prop_map(|(x, y)| json!(format!("({x},{y})"))),
            (-90.0f64..90.0, -180.0f64..180.0).prop_map(|(lat, lon)| json!({"lat": lat, "lon": lon})),
            proptest::collection::vec(any::<i32>().prop_map(|n| json!(n)), 0..3).prop_map(Value::Array),
        ]
    }

    fn batch_row() -> impl Strategy<Value = Row> {
        (
            any::<u32>(),
            proptest::collection::btree_map(
                prop_oneof![
                    Just("location".to_string()),
                    Just("attributes".to_string()),
                    "[a-z]{1,6}",
                ],
                field_value(),
                0..6,
            ),
        )
            .prop_map(|(id, fields)| {
                let mut row: Row = fields.into_iter().collect();
                row.insert("id".to_string(), json!(id));
                row
            })
    }

    proptest! {
        #[test]
        fn every_row_normalizes_under_any_sample(
            batch in proptest::collection::vec(batch_row(), 1..8),
            pick in any::<prop::sample::Index>(),
        ) {
            let sample = &batch[pick.index(batch.len())];
            let schema = infer(sample, &RESERVED);
            for row in &batch {
                let doc = normalize(row, "id", &schema);
                prop_assert!(doc.is_ok());
                let doc = doc.unwrap();
                prop_assert_eq!(doc.body.len(), row.len());
                prop_assert_eq!(&doc.body["id"], &row["id"]);
            }
        }
    }
}

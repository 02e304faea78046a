//! Index settings and mappings derived from a table spec.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::table::TableSyncSpec;

/// Analyzer applied to the text fields of every index.
///
/// The default transliterates between Latin and Cyrillic so that a search
/// typed in either script matches names stored in the other. It requires the
/// `analysis-icu` plugin on the index backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Analyzer name referenced by field mappings.
    pub name: String,
    pub tokenizer: String,
    /// ICU transform id. `None` builds a lowercase-only analyzer.
    pub transliteration: Option<String>,
    /// Fields mapped as `text` with this analyzer.
    pub text_fields: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            name: "translit_analyzer".to_string(),
            tokenizer: "standard".to_string(),
            transliteration: Some("Any-Latin; Latin-Cyrillic".to_string()),
            text_fields: vec!["name".to_string()],
        }
    }
}

/// Name of the token filter generated for [`AnalyzerConfig::transliteration`].
const TRANSLIT_FILTER: &str = "translit_transform";

/// Index name plus the settings and mappings it must be created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub settings: Value,
    pub mappings: Value,
}

impl IndexDescriptor {
    /// Builds the descriptor for `spec`: analyzer settings, `text` mappings for
    /// the analyzer's fields, `geo_point` for the geo field and `object` for
    /// the nested field.
    #[must_use]
    pub fn for_table(spec: &TableSyncSpec, analyzer: &AnalyzerConfig) -> Self {
        let mut filters = vec![json!("lowercase")];
        let mut analysis = Map::new();
        if let Some(id) = &analyzer.transliteration {
            filters.push(json!(TRANSLIT_FILTER));
            analysis.insert(
                "filter".to_string(),
                json!({ TRANSLIT_FILTER: { "type": "icu_transform", "id": id } }),
            );
        }
        analysis.insert(
            "analyzer".to_string(),
            json!({
                analyzer.name.as_str(): {
                    "tokenizer": analyzer.tokenizer,
                    "filter": filters,
                }
            }),
        );

        let mut properties = Map::new();
        for field in &analyzer.text_fields {
            properties.insert(
                field.clone(),
                json!({
                    "type": "text",
                    "analyzer": analyzer.name,
                    "search_analyzer": analyzer.name,
                }),
            );
        }
        if let Some(geo) = &spec.geo_field {
            properties.insert(geo.clone(), json!({ "type": "geo_point" }));
        }
        if let Some(nested) = &spec.nested_field {
            properties
                .entry(nested.clone())
                .or_insert_with(|| json!({ "type": "object" }));
        }

        Self {
            name: spec.index_name().to_string(),
            settings: json!({ "analysis": analysis }),
            mappings: json!({ "properties": properties }),
        }
    }

    /// Request body for an index-create call.
    #[must_use]
    pub fn body(&self) -> Value {
        json!({ "settings": self.settings, "mappings": self.mappings })
    }
}

//! Metadata Domain Model
//!
//! Free-form metadata record attached to a resource. Only a few keys are
//! required; the rest feed the ArcGIS metadata document when present.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::models::dataset::{ColumnKind, Dataset};

/// Columns published as strings whatever their values look like
const STRING_COLUMNS: [&str; 2] = ["data_vintage", "year_built"];

/// One documented attribute column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub title: String,
    pub description: String,
}

/// Validated metadata record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceMetadata {
    values: Map<String, Value>,
}

impl ResourceMetadata {
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value of `key` rendered as text.
    ///
    /// Strings are returned as-is, numbers and booleans are formatted, and
    /// null or missing keys yield `None`.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    #[must_use]
    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Field descriptions from the `fields` list; malformed entries are skipped
    #[must_use]
    pub fn fields(&self) -> Vec<FieldDescription> {
        let Some(Value::Array(entries)) = self.values.get("fields") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(Value::as_object)
            .map(|entry| FieldDescription {
                title: entry
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect()
    }
}

/// Portal field definition for a tabular publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: &'static str,
}

/// Map each dataset column to an ESRI field type
#[must_use]
pub fn build_field_mappings(dataset: &Dataset) -> Vec<FieldMapping> {
    let fields: Vec<FieldMapping> = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let field_type = if STRING_COLUMNS.contains(&name.as_str()) {
                "esriFieldTypeString"
            } else {
                match dataset.column_kind(index) {
                    ColumnKind::Integer => "esriFieldTypeInteger",
                    ColumnKind::Float => "esriFieldTypeDouble",
                    _ => "esriFieldTypeString",
                }
            };
            FieldMapping {
                name: name.clone(),
                field_type,
            }
        })
        .collect();
    tracing::debug!(count = fields.len(), "Built field mappings");
    fields
}

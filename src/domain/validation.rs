//! Parameter Validation
//!
//! Checks the loosely typed job input (resource parameters, source
//! configuration, metadata) and turns it into typed domain values. Every
//! failure is a `DataPortalError::Validation` with a message a job author can
//! act on.

use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use validator::Validate;

use crate::domain::models::dataset::Dataset;
use crate::domain::models::metadata::ResourceMetadata;
use crate::domain::models::resource::{ResourceParams, ShareLevel};
use crate::domain::models::source::SourceConfig;
use crate::shared::errors::{DataPortalError, Result};

lazy_static! {
    static ref TAG_SEPARATOR: Regex = Regex::new("[,;]").expect("valid regex");

    /// Statements and procedure prefixes that have no place in an export query
    static ref DANGEROUS_SQL: Regex = Regex::new(
        r"(?i)\b(?:drop|delete|truncate|alter|create|insert|update|exec|execute)\b|\b(?:sp|xp)_"
    )
    .expect("valid regex");

    /// Plain SQL Server identifier (no brackets, no dots)
    static ref SQL_IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_#@][A-Za-z0-9_#@$]*$").expect("valid regex");
}

const REQUIRED_RESOURCE_PARAMS: [&str; 2] = ["title", "tags"];
const REQUIRED_METADATA_FIELDS: [&str; 3] = ["contact_name", "contact_email", "organization_name"];
const REQUIRED_SIMPLE_SOURCE_FIELDS: [&str; 2] = ["table_name", "feature_dataset"];

/// Validates a table or schema name used to build a query
fn validate_sql_identifier(name: &str) -> Result<(), validator::ValidationError> {
    if SQL_IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("sql_identifier");
        error.message = Some(format!("'{name}' is not a valid SQL identifier").into());
        Err(error)
    }
}

/// Names that end up interpolated into generated SQL
#[derive(Debug, Validate)]
struct SourceIdentifiers {
    #[validate(custom(function = "validate_sql_identifier"))]
    table_name: Option<String>,

    #[validate(custom(function = "validate_sql_identifier"))]
    schema: String,
}

/// Null, false, zero and empty strings or containers count as empty
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Check that every key in `required` is present and not empty.
///
/// # Errors
///
/// Returns a validation error listing missing and empty keys.
pub fn validate_required_parameters(params: &Map<String, Value>, required: &[&str]) -> Result<()> {
    let mut missing = Vec::new();
    let mut empty = Vec::new();

    for key in required {
        match params.get(*key) {
            None => missing.push(*key),
            Some(value) if is_empty_value(value) => empty.push(*key),
            Some(_) => {}
        }
    }

    if missing.is_empty() && empty.is_empty() {
        return Ok(());
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("Missing parameters: {}", missing.join(", ")));
    }
    if !empty.is_empty() {
        parts.push(format!("Empty parameters: {}", empty.join(", ")));
    }
    Err(DataPortalError::validation("Required parameters validation failed")
        .with_details(parts.join("; ")))
}

/// Normalize a share level (`everyone`, `org`, `private`, any case).
///
/// # Errors
///
/// Returns a validation error for non-strings and unknown levels.
pub fn validate_share_level(value: &Value) -> Result<ShareLevel> {
    let Value::String(raw) = value else {
        return Err(DataPortalError::validation("Share level must be a string"));
    };
    let normalized = raw.trim().to_lowercase();
    ShareLevel::from_normalized(&normalized).ok_or_else(|| {
        let options: Vec<&str> = ShareLevel::ALL.iter().map(ShareLevel::as_str).collect();
        DataPortalError::validation(format!("Invalid share level: {raw}"))
            .with_details(format!("Valid options are: {}", options.join(", ")))
    })
}

/// Keep the trimmed, non-empty string entries of a list
fn clean_string_list(items: &[Value], kind: &str) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim()),
            other => {
                tracing::warn!(value = %other, "Skipping non-string {kind}");
                None
            }
        })
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Normalize tags given as a `,`/`;` separated string or a list.
///
/// # Errors
///
/// Returns a validation error for other types or when no tag survives.
pub fn validate_tags(value: &Value) -> Result<Vec<String>> {
    let tags = match value {
        Value::String(raw) => TAG_SEPARATOR
            .split(raw.trim_end_matches([',', ';']))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Value::Array(items) => clean_string_list(items, "tag"),
        _ => {
            return Err(DataPortalError::validation(
                "Tags must be a string or list of strings",
            ))
        }
    };

    if tags.is_empty() {
        return Err(DataPortalError::validation("At least one valid tag is required"));
    }
    Ok(tags)
}

/// Normalize groups given as a `;` separated string or a list. An empty
/// result is allowed.
///
/// # Errors
///
/// Returns a validation error for types other than string or list.
pub fn validate_groups(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(raw) => Ok(raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()),
        Value::Array(items) => Ok(clean_string_list(items, "group")),
        _ => Err(DataPortalError::validation(
            "Groups must be a string or list of strings",
        )),
    }
}

/// Check that a query returned something worth publishing.
///
/// # Errors
///
/// Returns a validation error for empty datasets, too few rows or no columns.
pub fn validate_dataset(dataset: &Dataset, min_rows: usize) -> Result<()> {
    if dataset.row_count() == 0 {
        return Err(DataPortalError::validation("Dataset is empty"));
    }
    if dataset.row_count() < min_rows {
        return Err(DataPortalError::validation(format!(
            "Dataset has {} rows, minimum required: {}",
            dataset.row_count(),
            min_rows
        )));
    }
    if dataset.column_count() == 0 {
        return Err(DataPortalError::validation("Dataset has no columns"));
    }
    tracing::debug!(
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "Dataset validation passed"
    );
    Ok(())
}

/// Suspicious keywords found in `sql`, lowercased, in order of appearance
#[must_use]
pub fn dangerous_sql_keywords(sql: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in DANGEROUS_SQL.find_iter(sql) {
        let keyword = m.as_str().to_lowercase();
        if !found.contains(&keyword) {
            found.push(keyword);
        }
    }
    found
}

/// Check a custom query and return it trimmed. Suspicious keywords are only
/// logged.
///
/// # Errors
///
/// Returns a validation error for non-strings, empty queries and anything
/// that does not start with `SELECT`.
pub fn validate_sql_query(value: &Value) -> Result<String> {
    let Value::String(raw) = value else {
        return Err(DataPortalError::validation("SQL query must be a string"));
    };
    let sql = raw.trim();
    if sql.is_empty() {
        return Err(DataPortalError::validation("SQL query cannot be empty"));
    }

    for keyword in dangerous_sql_keywords(sql) {
        tracing::warn!(keyword = %keyword, "Potentially dangerous SQL keyword detected");
    }

    if !sql.to_lowercase().starts_with("select") {
        return Err(DataPortalError::validation("SQL query must start with SELECT"));
    }
    Ok(sql.to_string())
}

/// Check a file path string, optionally requiring that it exists.
///
/// # Errors
///
/// Returns a validation error for non-strings, blank paths and missing files.
pub fn validate_file_path(value: &Value, must_exist: bool) -> Result<PathBuf> {
    let Value::String(raw) = value else {
        return Err(DataPortalError::validation("File path must be a string"));
    };
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return Err(DataPortalError::validation("File path cannot be empty"));
    }
    let path = PathBuf::from(cleaned);
    if must_exist && !path.exists() {
        return Err(DataPortalError::validation(format!(
            "File does not exist: {cleaned}"
        )));
    }
    Ok(path)
}

/// Check the metadata record attached to a resource.
///
/// # Errors
///
/// Returns a validation error for non-maps, missing required fields, an
/// e-mail without `@` and a non-string phone number.
pub fn validate_metadata(value: &Value) -> Result<ResourceMetadata> {
    let Value::Object(map) = value else {
        return Err(DataPortalError::validation("Metadata must be a dictionary"));
    };

    let missing: Vec<&str> = REQUIRED_METADATA_FIELDS
        .into_iter()
        .filter(|field| !map.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(DataPortalError::validation("Required metadata fields missing")
            .with_details(format!("Missing: {}", missing.join(", "))));
    }

    if let Some(email) = map.get("contact_email").filter(|v| !is_empty_value(v)) {
        if !email.as_str().is_some_and(|e| e.contains('@')) {
            return Err(DataPortalError::validation(
                "Invalid email format in contact_email",
            ));
        }
    }

    if let Some(phone) = map.get("contact_phone").filter(|v| !is_empty_value(v)) {
        if !phone.is_string() {
            return Err(DataPortalError::validation("Contact phone must be a string"));
        }
    }

    Ok(ResourceMetadata::new(map.clone()))
}

fn optional_bool(map: &Map<String, Value>, key: &str) -> Result<bool> {
    match map.get(key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(DataPortalError::validation(format!(
            "Parameter '{key}' must be a boolean"
        ))),
    }
}

fn optional_string(map: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DataPortalError::validation(format!(
            "Parameter '{key}' must be a string"
        ))),
    }
}

fn parse_srid(value: &Value) -> Result<i32> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<i32>()
            .map_err(|_| DataPortalError::validation("SRID must be a valid integer")),
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| DataPortalError::validation("SRID must be an integer")),
        _ => Err(DataPortalError::validation("SRID must be an integer")),
    }
}

/// Check the source configuration of a job.
///
/// # Errors
///
/// Returns a validation error for non-maps, simple sources without
/// `table_name`/`feature_dataset`, a bad `fields_to_exclude`, an invalid
/// custom query or table/schema names that are not plain identifiers.
pub fn validate_source_config(value: &Value) -> Result<SourceConfig> {
    let Value::Object(map) = value else {
        return Err(DataPortalError::validation(
            "Source configuration must be a dictionary",
        ));
    };

    let is_simple = optional_bool(map, "is_simple")?;
    if is_simple {
        let missing: Vec<&str> = REQUIRED_SIMPLE_SOURCE_FIELDS
            .into_iter()
            .filter(|field| !map.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(
                DataPortalError::validation("Required source fields missing for simple source")
                    .with_details(format!("Missing: {}", missing.join(", "))),
            );
        }
    }

    let fields_to_exclude = match map.get("fields_to_exclude") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::Array(items)) => clean_string_list(items, "excluded field"),
        Some(_) => {
            return Err(DataPortalError::validation(
                "fields_to_exclude must be a string or list",
            ))
        }
    };

    let sql_query = match map.get("sql_query") {
        None | Some(Value::Null) => None,
        Some(query) => Some(validate_sql_query(query)?),
    };

    let identifiers = SourceIdentifiers {
        table_name: optional_string(map, "table_name")?,
        schema: optional_string(map, "schema")?.unwrap_or_else(|| "dbo".to_string()),
    };
    identifiers.validate()?;

    Ok(SourceConfig {
        table_name: identifiers.table_name,
        feature_dataset: optional_string(map, "feature_dataset")?,
        schema: identifiers.schema,
        is_simple,
        sql_query,
        fields_to_exclude,
    })
}

/// Check and normalize the resource parameters of a job.
///
/// # Errors
///
/// Returns a validation error for the first rule that fails.
pub fn validate_resource_parameters(value: &Value) -> Result<ResourceParams> {
    let Value::Object(map) = value else {
        return Err(DataPortalError::validation("Parameters must be a dictionary"));
    };

    validate_required_parameters(map, &REQUIRED_RESOURCE_PARAMS)?;

    let title = optional_string(map, "title")?
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    let tags = validate_tags(map.get("tags").unwrap_or(&Value::Null))?;

    let share_level = map
        .get("share_level")
        .map(validate_share_level)
        .transpose()?
        .unwrap_or_default();
    let groups = map
        .get("groups")
        .map(validate_groups)
        .transpose()?
        .unwrap_or_default();

    let allow_edits = optional_bool(map, "allow_edits")?;
    let spatial_data = optional_bool(map, "spatial_data")?;

    let srid = map.get("srid").map(parse_srid).transpose()?;

    let metadata = match map.get("metadata") {
        None | Some(Value::Null) => None,
        Some(md) => Some(validate_metadata(md)?),
    };

    Ok(ResourceParams {
        title,
        tags,
        share_level,
        groups,
        spatial_data,
        allow_edits,
        snippet: optional_string(map, "snippet")?.unwrap_or_default(),
        license_info: optional_string(map, "licenseInfo")?.unwrap_or_default(),
        srid,
        metadata,
    })
}

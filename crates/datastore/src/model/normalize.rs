//! Record normalization
//!
//! Incoming records are JSON maps; the compiler binds [`DatabaseValue`]s. The
//! model's attribute types decide how each value is encoded.

use serde_json::Value as JsonValue;

use super::definition::{AttributeType, ModelDefinition};
use crate::backends::{DatabaseValue, Record};
use crate::error::{DatastoreError, DatastoreResult};
use crate::query::ValueMap;

/// Convert `record` into bindable column values for `model`
pub fn normalize_values(model: &ModelDefinition, record: &Record) -> DatastoreResult<ValueMap> {
    let mut values = ValueMap::new();

    for (column, value) in record {
        let attribute = model.attribute(column).ok_or_else(|| {
            DatastoreError::Validation(format!(
                "'{}' is not an attribute of '{}'",
                column, model.identity
            ))
        })?;

        let normalized = match (attribute.attribute_type, value) {
            (_, JsonValue::Null) => DatabaseValue::Null,
            (AttributeType::Json, value) => DatabaseValue::Json(value.clone()),
            (AttributeType::Binary, value) => DatabaseValue::Bytes(binary(column, value)?),
            (AttributeType::Uuid, JsonValue::String(text)) => uuid::Uuid::parse_str(text)
                .map(DatabaseValue::Uuid)
                .map_err(|e| invalid(column, format!("not a UUID ({})", e)))?,
            (AttributeType::DateTime, JsonValue::String(text)) => {
                chrono::DateTime::parse_from_rfc3339(text)
                    .map(|dt| DatabaseValue::DateTime(dt.with_timezone(&chrono::Utc)))
                    .map_err(|e| invalid(column, format!("not an RFC 3339 timestamp ({})", e)))?
            }
            (AttributeType::Uuid | AttributeType::DateTime, _) => {
                return Err(invalid(column, "expected a string".to_string()))
            }
            (_, JsonValue::Array(_) | JsonValue::Object(_)) => {
                return Err(invalid(
                    column,
                    "only json attributes accept arrays or objects".to_string(),
                ))
            }
            (_, scalar) => DatabaseValue::from_json(scalar),
        };

        values.insert(column.clone(), normalized);
    }

    Ok(values)
}

/// Reject a new record that leaves a required attribute unset
pub fn check_required(model: &ModelDefinition, record: &Record) -> DatastoreResult<()> {
    let missing: Vec<&str> = model
        .attributes
        .iter()
        .filter(|a| a.required && !a.auto_increment)
        .filter(|a| record.get(&a.name).map_or(true, JsonValue::is_null))
        .map(|a| a.name.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatastoreError::Validation(format!(
            "missing required attributes for '{}': {}",
            model.identity,
            missing.join(", ")
        )))
    }
}

fn binary(column: &str, value: &JsonValue) -> DatastoreResult<Vec<u8>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(column, "binary attributes expect a byte array".to_string()))?;

    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| invalid(column, format!("{} is not a byte", item)))
        })
        .collect()
}

fn invalid(column: &str, reason: String) -> DatastoreError {
    DatastoreError::Validation(format!("invalid value for '{}': {}", column, reason))
}

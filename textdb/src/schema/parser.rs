//! Schema definition files: one YAML mapping of field name → kind name per
//! table, e.g. `pinned: boolean` or `notes: relation:notes`. Mapping order
//! in the file is the schema's field order.

use super::types::Schema;
use crate::error::{Result, TextDbError};
use serde_yaml::{Mapping, Value};

/// Parse a schema definition file's contents, preserving declared order.
pub fn schema_from_yaml(content: &str) -> Result<Schema> {
    let mut schema = Schema::new();
    if content.trim().is_empty() {
        return Ok(schema);
    }

    let mapping: Mapping = serde_yaml::from_str(content)?;
    for (key, value) in &mapping {
        let name = key.as_str().ok_or_else(|| {
            TextDbError::Schema(format!("field name must be a string, got {key:?}"))
        })?;
        let kind_name = value.as_str().ok_or_else(|| {
            TextDbError::Schema(format!("kind for field '{name}' must be a string, got {value:?}"))
        })?;
        schema.define_field(name, kind_name)?;
    }

    Ok(schema)
}

/// Serialize a schema back to definition-file form, in declared order.
pub fn schema_to_yaml(schema: &Schema) -> Result<String> {
    if schema.is_empty() {
        return Ok(String::new());
    }

    let mut mapping = Mapping::new();
    for field in schema.fields() {
        mapping.insert(
            Value::String(field.name.clone()),
            Value::String(field.kind.kind_name()),
        );
    }
    Ok(serde_yaml::to_string(&mapping)?)
}

//! Relation integrity. Relation fields hold plain name lists, never object
//! references, so checking and resolving them is always an explicit pass
//! over the current in-memory database — never partially-written disk
//! state, which is why save order across tables does not matter.

use crate::database::Database;
use crate::error::{Result, TextDbError};
use crate::record::RecordSnapshot;
use crate::schema::types::PropertyKind;
use crate::table::Table;
use serde_yaml::Value;

/// One record's unresolved names in one relation field.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingRef {
    pub table: String,
    pub record: String,
    pub field: String,
    pub missing: Vec<String>,
}

impl DanglingRef {
    fn into_error(self) -> TextDbError {
        TextDbError::DanglingReference {
            table: self.table,
            record: self.record,
            field: self.field,
            missing: self.missing,
        }
    }
}

/// Resolve a relation field to its target table, or fail with a schema
/// error naming every table that does exist.
fn target_table<'a>(db: &'a Database, table: &Table, field_name: &str) -> Result<&'a Table> {
    let field = table
        .schema()
        .field(field_name)
        .ok_or_else(|| TextDbError::UnknownField {
            table: table.name().to_string(),
            field: field_name.to_string(),
        })?;
    let target = match &field.kind {
        PropertyKind::Relation { target } => target.clone(),
        other => {
            return Err(TextDbError::Schema(format!(
                "field '{field_name}' in table '{}' is {}, not a relation",
                table.name(),
                other.kind_name()
            )))
        }
    };
    db.try_table(&target).ok_or_else(|| {
        TextDbError::Schema(format!(
            "relation field '{field_name}' in table '{}' targets undeclared table '{target}'; known tables: [{}]",
            table.name(),
            db.table_names().join(", ")
        ))
    })
}

fn listed_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Every dangling name in one relation field, across all live records of
/// `table`, checked against the target table's live record set.
pub fn dangling_refs(table: &Table, field_name: &str, db: &Database) -> Result<Vec<DanglingRef>> {
    let target = target_table(db, table, field_name)?;

    let mut dangling = Vec::new();
    for record in table.iter() {
        let names = listed_names(record.properties().get(field_name));
        let missing: Vec<String> = names
            .into_iter()
            .filter(|n| !target.contains(n))
            .collect();
        if !missing.is_empty() {
            dangling.push(DanglingRef {
                table: table.name().to_string(),
                record: record.name().to_string(),
                field: field_name.to_string(),
                missing,
            });
        }
    }
    Ok(dangling)
}

/// Check every relation field of every table. Fails on the first dangling
/// reference — no silent pruning — or on a relation whose target table was
/// never declared.
pub fn validate_all(db: &Database) -> Result<()> {
    for table in db.tables() {
        for field in table.schema().fields() {
            if matches!(field.kind, PropertyKind::Relation { .. }) {
                if let Some(first) = dangling_refs(table, &field.name, db)?.into_iter().next() {
                    return Err(first.into_error());
                }
            }
        }
    }
    Ok(())
}

/// Resolve one record's relation field to snapshots of its targets, in
/// stored order. Fails if any listed name is dangling at access time.
pub fn resolve(
    db: &Database,
    table_name: &str,
    field_name: &str,
    record_name: &str,
) -> Result<Vec<RecordSnapshot>> {
    let table = db.table(table_name)?;
    let target = target_table(db, table, field_name)?;

    let record = table.record(record_name).ok_or_else(|| TextDbError::NoSuchRecord {
        table: table_name.to_string(),
        name: record_name.to_string(),
    })?;

    let names = listed_names(record.properties().get(field_name));
    let missing: Vec<String> = names
        .iter()
        .filter(|n| !target.contains(n))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(TextDbError::DanglingReference {
            table: table_name.to_string(),
            record: record.name().to_string(),
            field: field_name.to_string(),
            missing,
        });
    }

    names.iter().map(|n| target.get(n)).collect()
}

use crate::error::{Result, TextDbError};
use crate::record::{normalize_name, Record, RecordSnapshot, RecordState};
use crate::schema::types::Schema;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Reserved key in `create`/`edit` argument mappings: sets the body text
/// instead of going through the schema.
pub const CONTENT_KEY: &str = "content";

/// A named collection of same-schema records plus the schema itself.
///
/// Invariants held here: record names are unique (a Removed record still
/// reserves its name until the next save purges it), and every live
/// record's property set exactly equals the schema's field set —
/// reconciliation repairs any drift instead of leaving it standing.
#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Schema,
    records: BTreeMap<String, Record>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Table {
            name: name.to_string(),
            schema: Schema::new(),
            records: BTreeMap::new(),
        }
    }

    pub(crate) fn with_schema(name: &str, schema: Schema) -> Self {
        Table {
            name: name.to_string(),
            schema,
            records: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Declare or redefine a field. Existing records are reconciled
    /// immediately so their property sets never drift from the schema.
    pub fn define_field(&mut self, field_name: &str, kind_name: &str) -> Result<()> {
        self.schema.define_field(field_name, kind_name)?;
        self.reconcile_all();
        Ok(())
    }

    /// Drop a field from the schema. Every record loses its stored value
    /// at the eager reconcile that follows.
    pub fn remove_field(&mut self, field_name: &str) -> Result<()> {
        if !self.schema.remove_field(field_name) {
            return Err(TextDbError::UnknownField {
                table: self.name.clone(),
                field: field_name.to_string(),
            });
        }
        self.reconcile_all();
        Ok(())
    }

    /// Rename a field, keeping its kind, its schema position, and every
    /// record's stored value.
    pub fn rename_field(&mut self, from: &str, to: &str) -> Result<()> {
        if self.schema.contains(to) {
            return Err(TextDbError::Schema(format!(
                "cannot rename field '{from}' to '{to}' in table '{}': field already exists",
                self.name
            )));
        }
        if !self.schema.rename_field(from, to) {
            return Err(TextDbError::UnknownField {
                table: self.name.clone(),
                field: from.to_string(),
            });
        }

        let from_key = Value::String(from.to_string());
        let to_key = Value::String(to.to_string());
        for record in self.records.values_mut() {
            if let Some(value) = record.properties_mut().remove(&from_key) {
                record.properties_mut().insert(to_key.clone(), value);
                record.mark_dirty();
            }
        }
        self.reconcile_all();
        Ok(())
    }

    /// Declare a relation field pointing at another table. The field is
    /// named after the target table. Idempotent; the target table does not
    /// have to exist yet, but must exist by save time.
    pub fn declare_relation(&mut self, target_table_name: &str) -> Result<String> {
        self.schema
            .define_field(target_table_name, &format!("relation:{target_table_name}"))?;
        self.reconcile_all();
        Ok(target_table_name.to_string())
    }

    /// Create a record. Omitted fields get their kind's default; the
    /// reserved `content` key seeds the body text. The given name is
    /// slugified and becomes both the primary key and the file stem.
    pub fn create(&mut self, name: &str, field_values: Mapping) -> Result<String> {
        let name = normalize_name(name);
        if self.records.contains_key(&name) {
            return Err(TextDbError::DuplicateRecord {
                table: self.name.clone(),
                name,
            });
        }

        let mut properties = Mapping::new();
        for field in self.schema.fields() {
            properties.insert(
                Value::String(field.name.clone()),
                field.kind.default_value(),
            );
        }

        let mut content = String::new();
        for (key, value) in field_values {
            let key = match key.as_str() {
                Some(k) => k.to_string(),
                None => {
                    return Err(TextDbError::UnknownField {
                        table: self.name.clone(),
                        field: format!("{key:?}"),
                    })
                }
            };
            if key == CONTENT_KEY {
                content = content_string(value)?;
                continue;
            }
            let field = self.schema.field(&key).ok_or_else(|| TextDbError::UnknownField {
                table: self.name.clone(),
                field: key.clone(),
            })?;
            let coerced = field.kind.coerce(&key, value)?;
            properties.insert(Value::String(key), coerced);
        }

        let record = Record::new(name.clone(), properties, content, RecordState::Transient);
        self.records.insert(name.clone(), record);
        Ok(name)
    }

    /// Merge field values into an existing record. The reserved `content`
    /// key replaces the body text. The record becomes Dirty.
    pub fn edit(&mut self, name: &str, field_values: Mapping) -> Result<()> {
        let name = self.lookup_key(name);
        let schema = &self.schema;
        let record = match self.records.get_mut(&name) {
            Some(r) if r.is_live() => r,
            _ => {
                return Err(TextDbError::NoSuchRecord {
                    table: self.name.clone(),
                    name,
                })
            }
        };

        for (key, value) in field_values {
            let key = match key.as_str() {
                Some(k) => k.to_string(),
                None => {
                    return Err(TextDbError::UnknownField {
                        table: self.name.clone(),
                        field: format!("{key:?}"),
                    })
                }
            };
            if key == CONTENT_KEY {
                record.set_content(content_string(value)?);
                continue;
            }
            let field = schema.field(&key).ok_or_else(|| TextDbError::UnknownField {
                table: self.name.clone(),
                field: key.clone(),
            })?;
            let coerced = field.kind.coerce(&key, value)?;
            record
                .properties_mut()
                .insert(Value::String(key), coerced);
        }

        record.mark_dirty();
        Ok(())
    }

    /// Detached snapshot of a live record, fields in schema order.
    pub fn get(&self, name: &str) -> Result<RecordSnapshot> {
        let name = self.lookup_key(name);
        match self.records.get(&name) {
            Some(r) if r.is_live() => Ok(RecordSnapshot {
                name: r.name().to_string(),
                properties: self.header_in_schema_order(r),
                content: r.content().to_string(),
            }),
            _ => Err(TextDbError::NoSuchRecord {
                table: self.name.clone(),
                name,
            }),
        }
    }

    /// Mark a record Removed: invisible immediately, file deleted and name
    /// freed at the next successful save.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let name = self.lookup_key(name);
        match self.records.get_mut(&name) {
            Some(r) if r.is_live() => {
                r.set_state(RecordState::Removed);
                Ok(())
            }
            _ => Err(TextDbError::NoSuchRecord {
                table: self.name.clone(),
                name,
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records
            .get(&self.lookup_key(name))
            .map(Record::is_live)
            .unwrap_or(false)
    }

    /// Lookups accept either a stored name (which, for hand-created files,
    /// may not be a slug) or the pre-slug form the caller originally used.
    fn lookup_key(&self, name: &str) -> String {
        if self.records.contains_key(name) {
            return name.to_string();
        }
        normalize_name(name)
    }

    /// Names of live records.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(Record::name).collect()
    }

    /// Live records only; Removed ones are already invisible here.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().filter(|r| r.is_live())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize one record against a schema: missing declared fields get
    /// their kind's default, undeclared fields are dropped, and a value
    /// whose shape no longer matches its declared kind (the field was
    /// re-kinded, or the file was hand-edited) is reset to the default.
    /// Idempotent.
    pub fn reconcile(schema: &Schema, record: &mut Record) {
        let declared: Vec<Value> = schema
            .fields()
            .iter()
            .map(|f| Value::String(f.name.clone()))
            .collect();
        record
            .properties_mut()
            .retain(|key, _| declared.contains(key));

        for field in schema.fields() {
            let key = Value::String(field.name.clone());
            let needs_default = match record.properties().get(&key) {
                Some(value) => !field.kind.matches(value),
                None => true,
            };
            if needs_default {
                record
                    .properties_mut()
                    .insert(key, field.kind.default_value());
            }
        }
    }

    pub(crate) fn reconcile_all(&mut self) {
        for record in self.records.values_mut() {
            Self::reconcile(&self.schema, record);
        }
    }

    /// Insert a record decoded from disk; reconciled and Clean.
    pub(crate) fn insert_loaded(&mut self, name: String, fields: Mapping, content: String) {
        let mut record = Record::new(name.clone(), fields, content, RecordState::Clean);
        Self::reconcile(&self.schema, &mut record);
        self.records.insert(name, record);
    }

    /// Header mapping for serialization, in the schema's declared order.
    pub(crate) fn header_in_schema_order(&self, record: &Record) -> Mapping {
        let mut ordered = Mapping::new();
        for field in self.schema.fields() {
            let key = Value::String(field.name.clone());
            let value = record
                .properties()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| field.kind.default_value());
            ordered.insert(key, value);
        }
        ordered
    }

    pub(crate) fn record(&self, name: &str) -> Option<&Record> {
        self.records.get(&self.lookup_key(name)).filter(|r| r.is_live())
    }

    /// Drop Removed records, returning their names. Called after a save
    /// has deleted their files.
    pub(crate) fn purge_removed(&mut self) -> Vec<String> {
        let purged: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| !r.is_live())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &purged {
            self.records.remove(name);
        }
        purged
    }

    pub(crate) fn mark_all_clean(&mut self) {
        for record in self.records.values_mut() {
            record.set_state(RecordState::Clean);
        }
    }
}

fn content_string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(TextDbError::InvalidValue {
            field: CONTENT_KEY.to_string(),
            kind: "text".to_string(),
            message: format!("content must be a string, got {other:?}"),
        }),
    }
}

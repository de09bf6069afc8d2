use crate::error::{Result, TextDbError};
use crate::record::normalize_name;
use serde_yaml::Value;

/// Every kind name the registry accepts, for error messages.
pub const VALID_KINDS: &str = "text, number, boolean, list, relation:<table>";

/// The closed set of value kinds a field can be declared as.
/// Each kind knows its zero value, how to check a stored value's shape,
/// and how to coerce caller-supplied input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Text,
    Number,
    Boolean,
    List,
    /// Ordered list of record names in the named target table.
    Relation { target: String },
}

impl PropertyKind {
    /// Resolve a kind name from a schema definition file.
    pub fn resolve(kind_name: &str) -> Result<Self> {
        match kind_name {
            "text" => Ok(PropertyKind::Text),
            "number" => Ok(PropertyKind::Number),
            "boolean" => Ok(PropertyKind::Boolean),
            "list" => Ok(PropertyKind::List),
            other => {
                if let Some(target) = other.strip_prefix("relation:") {
                    if target.is_empty() {
                        return Err(TextDbError::Schema(format!(
                            "relation kind is missing its target table; valid kinds are: {VALID_KINDS}"
                        )));
                    }
                    return Ok(PropertyKind::Relation {
                        target: target.to_string(),
                    });
                }
                Err(TextDbError::Schema(format!(
                    "unknown property kind '{other}'; valid kinds are: {VALID_KINDS}"
                )))
            }
        }
    }

    /// The kind name as written in a schema definition file.
    pub fn kind_name(&self) -> String {
        match self {
            PropertyKind::Text => "text".into(),
            PropertyKind::Number => "number".into(),
            PropertyKind::Boolean => "boolean".into(),
            PropertyKind::List => "list".into(),
            PropertyKind::Relation { target } => format!("relation:{target}"),
        }
    }

    /// Zero value for this kind.
    pub fn default_value(&self) -> Value {
        match self {
            PropertyKind::Text => Value::String(String::new()),
            PropertyKind::Number => Value::Number(serde_yaml::Number::from(0.0)),
            PropertyKind::Boolean => Value::Bool(false),
            PropertyKind::List | PropertyKind::Relation { .. } => Value::Sequence(Vec::new()),
        }
    }

    /// Whether a stored value already has this kind's YAML shape.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropertyKind::Text => value.is_string(),
            PropertyKind::Number => value.is_number(),
            PropertyKind::Boolean => value.is_bool(),
            PropertyKind::List => value.is_sequence(),
            PropertyKind::Relation { .. } => match value {
                Value::Sequence(items) => items.iter().all(|v| v.is_string()),
                _ => false,
            },
        }
    }

    /// Coerce a caller-supplied value into this kind. Strict: a value is
    /// accepted if it already has the right shape, or is a string that
    /// unambiguously reads as the kind. Relation member names are run
    /// through the slug rule so they always compare equal to stored names.
    pub fn coerce(&self, field: &str, value: Value) -> Result<Value> {
        if self.matches(&value) {
            if let PropertyKind::Relation { .. } = self {
                return Ok(normalize_relation(value));
            }
            return Ok(value);
        }

        match (self, &value) {
            (PropertyKind::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.invalid(field, &value)),
            },
            (PropertyKind::Number, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => Ok(Value::Number(serde_yaml::Number::from(n))),
                Err(_) => Err(self.invalid(field, &value)),
            },
            _ => Err(self.invalid(field, &value)),
        }
    }

    fn invalid(&self, field: &str, value: &Value) -> TextDbError {
        TextDbError::InvalidValue {
            field: field.to_string(),
            kind: self.kind_name(),
            message: format!("cannot interpret {value:?} as {}", self.kind_name()),
        }
    }
}

fn normalize_relation(value: Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(normalize_name(&s)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: PropertyKind,
}

/// Ordered field-name → kind mapping for one table.
/// Declaration order is significant: it controls serialized field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Idempotent upsert. Redefining an existing field keeps its position
    /// but replaces its kind; existing record values are re-derived to the
    /// new kind's default at the next reconcile pass.
    pub fn define_field(&mut self, name: &str, kind_name: &str) -> Result<()> {
        let kind = PropertyKind::resolve(kind_name)?;
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.fields.push(FieldDefinition {
                name: name.to_string(),
                kind,
            }),
        }
        Ok(())
    }

    /// Remove a declared field. Returns false if no such field exists.
    /// Stored record values disappear at the next reconcile pass.
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        self.fields.len() != before
    }

    /// Rename a field in place, keeping its position and kind. Returns
    /// false if no such field exists.
    pub fn rename_field(&mut self, from: &str, to: &str) -> bool {
        match self.fields.iter_mut().find(|f| f.name == from) {
            Some(field) => {
                field.name = to.to_string();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_known_kinds() {
        assert_eq!(PropertyKind::resolve("text").unwrap(), PropertyKind::Text);
        assert_eq!(
            PropertyKind::resolve("boolean").unwrap(),
            PropertyKind::Boolean
        );
        assert_eq!(
            PropertyKind::resolve("relation:notes").unwrap(),
            PropertyKind::Relation {
                target: "notes".into()
            }
        );
    }

    #[test]
    fn unknown_kind_lists_valid_kinds() {
        let err = PropertyKind::resolve("bogus").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
        for kind in ["text", "number", "boolean", "list", "relation:<table>"] {
            assert!(msg.contains(kind), "missing '{kind}' in: {msg}");
        }
    }

    #[test]
    fn defaults_are_zero_values() {
        assert_eq!(
            PropertyKind::Text.default_value(),
            Value::String(String::new())
        );
        assert_eq!(PropertyKind::Boolean.default_value(), Value::Bool(false));
        assert_eq!(
            PropertyKind::Relation {
                target: "notes".into()
            }
            .default_value(),
            Value::Sequence(vec![])
        );
    }

    #[test]
    fn coerce_accepts_matching_shape() {
        let v = PropertyKind::Boolean
            .coerce("pinned", Value::Bool(true))
            .unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn coerce_reads_boolean_strings() {
        let v = PropertyKind::Boolean
            .coerce("pinned", Value::String("True".into()))
            .unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn coerce_rejects_garbage() {
        let err = PropertyKind::Boolean
            .coerce("pinned", Value::String("maybe".into()))
            .unwrap_err();
        assert!(matches!(err, TextDbError::InvalidValue { .. }));
    }

    #[test]
    fn coerce_normalizes_relation_names() {
        let kind = PropertyKind::Relation {
            target: "notes".into(),
        };
        let v = kind
            .coerce(
                "notes",
                Value::Sequence(vec![Value::String("My Note".into())]),
            )
            .unwrap();
        assert_eq!(v, Value::Sequence(vec![Value::String("my-note".into())]));
    }

    #[test]
    fn define_field_upsert_replaces_kind_in_place() {
        let mut schema = Schema::new();
        schema.define_field("url", "text").unwrap();
        schema.define_field("pinned", "boolean").unwrap();
        schema.define_field("url", "number").unwrap();

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.fields()[0].name, "url");
        assert_eq!(schema.fields()[0].kind, PropertyKind::Number);
    }

    #[test]
    fn remove_field_deletes_declaration() {
        let mut schema = Schema::new();
        schema.define_field("url", "text").unwrap();
        schema.define_field("pinned", "boolean").unwrap();

        assert!(schema.remove_field("url"));
        assert!(!schema.contains("url"));
        assert_eq!(schema.len(), 1);
        assert!(!schema.remove_field("url"));
    }

    #[test]
    fn rename_field_keeps_position_and_kind() {
        let mut schema = Schema::new();
        schema.define_field("url", "text").unwrap();
        schema.define_field("pinned", "boolean").unwrap();

        assert!(schema.rename_field("url", "link"));
        assert_eq!(schema.fields()[0].name, "link");
        assert_eq!(schema.fields()[0].kind, PropertyKind::Text);
        assert!(!schema.rename_field("url", "href"));
    }

    #[test]
    fn define_field_rejects_unknown_kind() {
        let mut schema = Schema::new();
        let err = schema.define_field("p", "bogus").unwrap_err();
        assert!(matches!(err, TextDbError::Schema(_)));
    }
}

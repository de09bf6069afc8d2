pub mod parser;
pub mod types;

pub use parser::{schema_from_yaml, schema_to_yaml};
pub use types::{FieldDefinition, PropertyKind, Schema};

pub mod database;
pub mod error;
pub mod record;
pub mod relation;
pub mod schema;
pub mod table;

pub use database::Database;
pub use error::{LoadWarning, Result, TextDbError};
pub use record::{Record, RecordSnapshot, RecordState};
pub use schema::{PropertyKind, Schema};
pub use table::Table;

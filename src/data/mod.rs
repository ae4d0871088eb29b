//! Entity-addressed data access for deskshell
//!
//! Tabs never see a database connection, a table name or a column type. They
//! talk to a [`DataApi`] implementation using logical entity names declared in
//! the entity registry, and receive owned [`Record`] copies back.
//!
//! ```rust,ignore
//! let id = data.create("TaskEntity", record! { "title" => "Write docs" }).await?;
//! let open = data
//!     .query("TaskEntity", QueryOptions::new().with_filter("status", "pending"))
//!     .await?;
//! data.update("TaskEntity", id, fields).await?;
//! ```

pub mod registry;
pub mod sqlite;

pub use registry::{EntityDescriptor, EntityOperation, EntityRegistry, FieldSpec, DEFAULT_DESCRIPTOR};
pub use sqlite::{generate_table_name, SqliteDataApi};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A row as seen by callers: field name to scalar value
pub type Record = serde_json::Map<String, Value>;

/// Shared handle to the active data-access implementation
pub type SharedDataApi = Arc<dyn DataApi>;

/// Data access errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data API has not been initialized")]
    NotInitialized,

    #[error("Entity '{0}' declares no fields in the entity registry")]
    UnknownEntity(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported value for field '{field}': {reason}")]
    UnsupportedValue { field: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DataResult<T> = Result<T, DataError>;

/// Options for [`DataApi::query`]
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Equality-only conjunction of `field = value`
    pub filters: Record,
    /// Column name, optionally followed by `ASC` or `DESC`
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// The only sanctioned path to storage.
///
/// Implementations resolve entity names to physical storage themselves;
/// callers must not assume anything about tables or columns beyond the
/// field names declared in the registry.
#[async_trait]
pub trait DataApi: Send + Sync {
    /// Fetch all records matching the options
    async fn query(&self, entity: &str, options: QueryOptions) -> DataResult<Vec<Record>>;

    /// Fetch a single record by identifier
    async fn get(&self, entity: &str, id: i64) -> DataResult<Option<Record>>;

    /// Insert a record and return its identifier
    async fn create(&self, entity: &str, fields: Record) -> DataResult<i64>;

    /// Update the given fields of a record; `false` when no row matched
    async fn update(&self, entity: &str, id: i64, fields: Record) -> DataResult<bool>;

    /// Delete a record; `false` when no row matched
    async fn delete(&self, entity: &str, id: i64) -> DataResult<bool>;

    /// Count records matching the equality filters
    async fn count(&self, entity: &str, filters: &Record) -> DataResult<i64>;
}

/// Build a [`Record`] from `key => value` pairs
#[macro_export]
macro_rules! record {
    () => { $crate::data::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::data::Record::new();
        $( record.insert(($key).to_string(), ::serde_json::Value::from($value)); )+
        record
    }};
}

/// Read an integer field, accepting integers, whole reals and numeric text
pub fn field_i64(record: &Record, name: &str) -> Option<i64> {
    match record.get(name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a flag field. SQLite stores booleans as integers.
pub fn field_bool(record: &Record, name: &str) -> Option<bool> {
    match record.get(name)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_macro() {
        let record = record! { "title" => "Plan", "done" => false, "priority" => 3 };
        assert_eq!(record.get("title"), Some(&json!("Plan")));
        assert_eq!(record.get("done"), Some(&json!(false)));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_field_helpers_accept_sqlite_shapes() {
        let record = record! { "flag_int" => 1, "flag_bool" => true, "count" => "42", "off" => 0 };
        assert_eq!(field_bool(&record, "flag_int"), Some(true));
        assert_eq!(field_bool(&record, "flag_bool"), Some(true));
        assert_eq!(field_bool(&record, "off"), Some(false));
        assert_eq!(field_i64(&record, "count"), Some(42));
        assert_eq!(field_i64(&record, "missing"), None);
    }

    #[test]
    fn test_query_options_builder() {
        let options = QueryOptions::new()
            .with_filter("status", "pending")
            .with_order_by("created_at DESC")
            .with_limit(10)
            .with_offset(5);
        assert_eq!(options.filters.get("status"), Some(&json!("pending")));
        assert_eq!(options.order_by.as_deref(), Some("created_at DESC"));
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.offset, Some(5));
    }
}

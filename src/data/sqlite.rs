//! SQLite implementation of the data access facade
//!
//! Entity names map to tables through the registry (explicit `table_name`)
//! or a generated name. Tables are created on first use from the declared
//! field list. One long-lived connection is owned by the store and guarded by
//! a single mutex, held for exactly one facade operation.

use super::registry::{EntityRegistry, FieldSpec};
use super::{DataApi, DataError, DataResult, QueryOptions, Record};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, Sqlite, TypeInfo, ValueRef};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Millisecond-precision timestamp used for `created_at` / `updated_at`
const NOW_SQL: &str = "(strftime('%Y-%m-%d %H:%M:%f', 'now'))";

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid word boundary pattern"));
static CASE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid case boundary pattern"));
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// Table names kept from deployments that predate generated names
const LEGACY_TABLE_NAMES: &[(&str, &str)] = &[
    ("task_entity", "tasks"),
    ("note_entity", "notes"),
    ("timer_reminder_entity", "timer_reminders"),
];

/// Derive the physical table name for an entity without a registry override.
///
/// `TaskEntity` style names are split at word boundaries, joined with
/// underscores, lower-cased and pluralised. The result depends only on the
/// input.
pub fn generate_table_name(entity_name: &str) -> String {
    let split = WORD_BOUNDARY.replace_all(entity_name, "${1}_${2}");
    let snake = CASE_BOUNDARY.replace_all(&split, "${1}_${2}").to_lowercase();

    if let Some((_, legacy)) = LEGACY_TABLE_NAMES.iter().find(|(name, _)| *name == snake) {
        return (*legacy).to_string();
    }

    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !word[..word.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);

    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with(['s', 'x', 'z']) || word.ends_with("ch") || word.ends_with("sh") {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

fn check_identifier(name: &str) -> DataResult<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(DataError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate an `ORDER BY` clause of the form `column [ASC|DESC]`
fn order_clause(order_by: &str) -> DataResult<String> {
    let mut parts = order_by.split_whitespace();
    let column = parts
        .next()
        .ok_or_else(|| DataError::InvalidIdentifier(order_by.to_string()))?;
    check_identifier(column)?;

    let direction = match parts.next().map(|d| d.to_ascii_uppercase()) {
        None => None,
        Some(d) if d == "ASC" || d == "DESC" => Some(d),
        Some(_) => return Err(DataError::InvalidIdentifier(order_by.to_string())),
    };
    if parts.next().is_some() {
        return Err(DataError::InvalidIdentifier(order_by.to_string()));
    }

    Ok(match direction {
        Some(direction) => format!("{} {}", column, direction),
        None => column.to_string(),
    })
}

/// SQL literal for a declared column default
fn default_literal(field: &FieldSpec, sql_type: &str) -> Option<String> {
    match &field.default {
        Some(Value::String(s)) => Some(format!("'{}'", s.replace('\'', "''"))),
        Some(Value::Bool(b)) => Some(if *b { "1" } else { "0" }.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) => Some("NULL".to_string()),
        Some(other) => Some(format!("'{}'", other.to_string().replace('\'', "''"))),
        None => match sql_type {
            "TEXT" => Some("''".to_string()),
            "INTEGER" | "REAL" | "BOOLEAN" | "NUMERIC" => Some("0".to_string()),
            _ => None,
        },
    }
}

/// Build the `CREATE TABLE` statement for an entity's declared fields
fn create_table_sql(table: &str, fields: &[FieldSpec]) -> DataResult<String> {
    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];

    for field in fields {
        if field.name == "id" {
            continue;
        }
        check_identifier(&field.name)?;
        let sql_type = field.field_type.trim().to_ascii_uppercase();
        check_identifier(&sql_type)?;

        let column = match default_literal(field, &sql_type) {
            Some(default) => format!("{} {} DEFAULT {}", field.name, sql_type, default),
            None => format!("{} {}", field.name, sql_type),
        };
        columns.push(column);
    }

    columns.push(format!("created_at TIMESTAMP DEFAULT {}", NOW_SQL));
    columns.push(format!("updated_at TIMESTAMP DEFAULT {}", NOW_SQL));

    Ok(format!("CREATE TABLE {} ({})", table, columns.join(", ")))
}

fn bind_value<'q>(query: SqliteQuery<'q>, field: &str, value: &Value) -> DataResult<SqliteQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                return Err(DataError::UnsupportedValue {
                    field: field.to_string(),
                    reason: format!("number {} does not fit in 64 bits", n),
                });
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(serde_json::to_string(value)?),
    })
}

/// `WHERE a = ?1 AND b = ?2` for an equality filter set
fn where_clause(filters: &Record) -> DataResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let conditions = filters
        .keys()
        .enumerate()
        .map(|(i, key)| check_identifier(key).map(|key| format!("{} = ?{}", key, i + 1)))
        .collect::<DataResult<Vec<_>>>()?;
    Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

fn row_to_record(row: &SqliteRow) -> DataResult<Record> {
    let mut record = Record::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" | "NUMERIC" => {
                    let f = row.try_get_unchecked::<f64, _>(idx)?;
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }

    Ok(record)
}

/// State owned by the store's lock
struct StoreState {
    conn: SqliteConnection,
    table_cache: HashMap<String, String>,
    ensured_tables: HashSet<String>,
}

/// SQLite-backed [`DataApi`]
pub struct SqliteDataApi {
    state: Mutex<StoreState>,
    registry: Arc<EntityRegistry>,
    db_path: Option<PathBuf>,
}

impl SqliteDataApi {
    /// Open (creating if needed) the database file at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P, registry: Arc<EntityRegistry>) -> DataResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);
        let conn = SqliteConnection::connect_with(&options).await?;

        info!("Opened data store at {}", db_path.display());
        Ok(Self::with_connection(conn, registry, Some(db_path.to_path_buf())))
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory(registry: Arc<EntityRegistry>) -> DataResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Self::with_connection(conn, registry, None))
    }

    fn with_connection(conn: SqliteConnection, registry: Arc<EntityRegistry>, db_path: Option<PathBuf>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                conn,
                table_cache: HashMap::new(),
                ensured_tables: HashSet::new(),
            }),
            registry,
            db_path,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Physical table for an entity, memoised for the store's lifetime
    pub async fn table_for(&self, entity: &str) -> DataResult<String> {
        let mut state = self.state.lock().await;
        self.resolve_table(&mut state, entity)
    }

    fn resolve_table(&self, state: &mut StoreState, entity: &str) -> DataResult<String> {
        if let Some(table) = state.table_cache.get(entity) {
            return Ok(table.clone());
        }

        let table = match self.registry.table_name_override(entity) {
            Some(table) => table.to_string(),
            None => generate_table_name(entity),
        };
        check_identifier(&table)?;

        state.table_cache.insert(entity.to_string(), table.clone());
        Ok(table)
    }

    /// Resolve the table and create it from the registry if it is missing
    async fn prepare(&self, state: &mut StoreState, entity: &str) -> DataResult<String> {
        let table = self.resolve_table(state, entity)?;
        if state.ensured_tables.contains(&table) {
            return Ok(table);
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(&table)
                .fetch_optional(&mut state.conn)
                .await?;

        if existing.is_none() {
            let fields = self
                .registry
                .get_fields(entity)
                .filter(|fields| !fields.is_empty())
                .ok_or_else(|| DataError::UnknownEntity(entity.to_string()))?;

            let sql = create_table_sql(&table, fields)?;
            debug!("Creating table for {}: {}", entity, sql);
            sqlx::query(&sql).execute(&mut state.conn).await?;
            info!("Created table {} for entity {}", table, entity);
        }

        state.ensured_tables.insert(table.clone());
        Ok(table)
    }
}

#[async_trait]
impl DataApi for SqliteDataApi {
    async fn query(&self, entity: &str, options: QueryOptions) -> DataResult<Vec<Record>> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let mut sql = format!("SELECT * FROM {}{}", table, where_clause(&options.filters)?);
        if let Some(order_by) = options.order_by.as_deref() {
            sql.push_str(&format!(" ORDER BY {}", order_clause(order_by)?));
        }
        match (options.limit, options.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        debug!("query {}: {}", entity, sql);
        let mut query = sqlx::query(&sql);
        for (field, value) in &options.filters {
            query = bind_value(query, field, value)?;
        }

        let rows = query.fetch_all(&mut state.conn).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn get(&self, entity: &str, id: i64) -> DataResult<Option<Record>> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let sql = format!("SELECT * FROM {} WHERE id = ?1", table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut state.conn)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn create(&self, entity: &str, fields: Record) -> DataResult<i64> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns = fields
                .keys()
                .map(|key| check_identifier(key))
                .collect::<DataResult<Vec<_>>>()?;
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        debug!("create {}: {}", entity, sql);
        let mut query = sqlx::query(&sql);
        for (field, value) in &fields {
            query = bind_value(query, field, value)?;
        }

        let result = query.execute(&mut state.conn).await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, entity: &str, id: i64, fields: Record) -> DataResult<bool> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let mut assignments = fields
            .keys()
            .enumerate()
            .map(|(i, key)| check_identifier(key).map(|key| format!("{} = ?{}", key, i + 1)))
            .collect::<DataResult<Vec<_>>>()?;
        assignments.push(format!("updated_at = {}", NOW_SQL));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            assignments.join(", "),
            fields.len() + 1
        );

        debug!("update {}#{}: {}", entity, id, sql);
        let mut query = sqlx::query(&sql);
        for (field, value) in &fields {
            query = bind_value(query, field, value)?;
        }

        let result = query.bind(id).execute(&mut state.conn).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, entity: &str, id: i64) -> DataResult<bool> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut state.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, entity: &str, filters: &Record) -> DataResult<i64> {
        let mut state = self.state.lock().await;
        let table = self.prepare(&mut state, entity).await?;

        let sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause(filters)?);
        let mut query = sqlx::query(&sql);
        for (field, value) in filters {
            query = bind_value(query, field, value)?;
        }

        let row = query.fetch_one(&mut state.conn).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_table_name() {
        assert_eq!(generate_table_name("UserProfile"), "user_profiles");
        assert_eq!(generate_table_name("ProjectEntity"), "project_entities");
        assert_eq!(generate_table_name("HTTPRequest"), "http_requests");
        assert_eq!(generate_table_name("Box"), "boxes");
        assert_eq!(generate_table_name("Day"), "days");
    }

    #[test]
    fn test_legacy_table_names() {
        assert_eq!(generate_table_name("TaskEntity"), "tasks");
        assert_eq!(generate_table_name("NoteEntity"), "notes");
        assert_eq!(generate_table_name("TimerReminderEntity"), "timer_reminders");
    }

    #[test]
    fn test_generated_name_is_stable() {
        let first = generate_table_name("InvoiceLineEntity");
        let second = generate_table_name("InvoiceLineEntity");
        assert_eq!(first, second);
        assert_eq!(first, "invoice_line_entities");
    }

    #[test]
    fn test_create_table_sql_defaults() {
        let fields = vec![
            FieldSpec::new("id", "INTEGER"),
            FieldSpec::new("title", "text"),
            FieldSpec::new("done", "BOOLEAN"),
            FieldSpec::new("label", "TEXT").with_default("it's"),
            FieldSpec::new("payload", "BLOB"),
        ];
        let sql = create_table_sql("tasks", &fields).unwrap();

        assert!(sql.starts_with("CREATE TABLE tasks (id INTEGER PRIMARY KEY AUTOINCREMENT, "));
        assert!(sql.contains("title TEXT DEFAULT ''"));
        assert!(sql.contains("done BOOLEAN DEFAULT 0"));
        assert!(sql.contains("label TEXT DEFAULT 'it''s'"));
        assert!(sql.contains("payload BLOB, "));
        assert!(sql.contains("created_at TIMESTAMP DEFAULT"));
        assert_eq!(sql.matches("id INTEGER").count(), 1);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(check_identifier("minute_cycle").is_ok());
        assert!(check_identifier("name; DROP TABLE x").is_err());
        assert!(check_identifier("1abc").is_err());
    }

    #[test]
    fn test_order_clause() {
        assert_eq!(order_clause("created_at").unwrap(), "created_at");
        assert_eq!(order_clause("created_at desc").unwrap(), "created_at DESC");
        assert!(order_clause("created_at; --").is_err());
        assert!(order_clause("a DESC extra").is_err());
        assert!(order_clause("a SIDEWAYS").is_err());
    }

    #[test]
    fn test_where_clause() {
        let filters = crate::record! { "a" => 1, "b" => "x" };
        assert_eq!(where_clause(&filters).unwrap(), " WHERE a = ?1 AND b = ?2");
        assert_eq!(where_clause(&Record::new()).unwrap(), "");
    }
}

//! Entity registry: the catalog of logical record types
//!
//! The registry describes which entities exist, which fields they carry and
//! which operations tabs are expected to perform on them. It is not a SQL
//! schema, although the SQLite store uses the declared fields to create
//! tables on demand.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Descriptor shipped with the application
pub const DEFAULT_DESCRIPTOR: &str = include_str!("../../data/entity_registry.json");

/// Operations an entity advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityOperation {
    Read,
    Write,
}

impl EntityOperation {
    /// Parse an operation keyword, case-insensitively
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "read" => Some(EntityOperation::Read),
            "write" => Some(EntityOperation::Write),
            _ => None,
        }
    }
}

/// Keeps the operations this build understands and skips the rest
fn deserialize_operations<'de, D>(deserializer: D) -> Result<Vec<EntityOperation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    let mut operations = Vec::new();
    for value in raw {
        match value.as_str().and_then(EntityOperation::parse) {
            Some(operation) if !operations.contains(&operation) => operations.push(operation),
            Some(_) => {}
            None => debug!("Ignoring unknown entity operation {}", value),
        }
    }
    Ok(operations)
}

/// A declared field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// SQL type keyword such as `TEXT`, `INTEGER` or `BOOLEAN`
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn default_field_type() -> String {
    "TEXT".to_string()
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// One entry of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, deserialize_with = "deserialize_operations")]
    pub operations: Vec<EntityOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntityDescriptor {
    pub fn supports(&self, operation: EntityOperation) -> bool {
        self.operations.contains(&operation)
    }
}

/// On-disk descriptor document
#[derive(Debug, Default, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    entities: Vec<EntityDescriptor>,
}

/// Read-only catalog of entities, loaded once
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    source: Option<PathBuf>,
    entities: HashMap<String, EntityDescriptor>,
    order: Vec<String>,
}

impl EntityRegistry {
    /// An empty catalog
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the catalog from a JSON or YAML descriptor file.
    ///
    /// A missing or unreadable file yields an empty catalog; so does a
    /// malformed one, after a warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No entity registry at {}, starting with an empty catalog", path.display());
            return Self {
                source: Some(path.to_path_buf()),
                ..Self::default()
            };
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read entity registry {}: {}", path.display(), e);
                return Self {
                    source: Some(path.to_path_buf()),
                    ..Self::default()
                };
            }
        };

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let document = match extension.as_deref() {
            Some("json") => serde_json::from_str::<RegistryDocument>(&content).map_err(|e| e.to_string()),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str::<RegistryDocument>(&content).map_err(|e| e.to_string())
            }
            _ => parse_document(&content),
        };

        let mut registry = match document {
            Ok(document) => Self::from_entities(document.entities),
            Err(e) => {
                warn!("Malformed entity registry {}: {}", path.display(), e);
                Self::default()
            }
        };
        registry.source = Some(path.to_path_buf());

        debug!("Loaded {} entities from {}", registry.len(), path.display());
        registry
    }

    /// Parse a descriptor held in memory, trying JSON first and then YAML
    pub fn from_descriptor_str(content: &str) -> Self {
        match parse_document(content) {
            Ok(document) => Self::from_entities(document.entities),
            Err(e) => {
                warn!("Malformed entity descriptor: {}", e);
                Self::default()
            }
        }
    }

    /// Build a catalog from descriptors. Entries without a name are dropped;
    /// a repeated name replaces the earlier entry.
    pub fn from_entities(entities: Vec<EntityDescriptor>) -> Self {
        let mut registry = Self::default();
        for entity in entities {
            if entity.name.trim().is_empty() {
                continue;
            }
            if !registry.entities.contains_key(&entity.name) {
                registry.order.push(entity.name.clone());
            }
            registry.entities.insert(entity.name.clone(), entity);
        }
        registry
    }

    /// Write the bundled descriptor to `path` unless a file already exists.
    /// Returns whether a file was written.
    pub fn install_default<P: AsRef<Path>>(path: P) -> std::io::Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_DESCRIPTOR)?;
        info!("Installed default entity registry at {}", path.display());
        Ok(true)
    }

    /// Path the catalog was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get_entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    /// All descriptors in file order
    pub fn all_entities(&self) -> Vec<&EntityDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.entities.get(name))
            .collect()
    }

    pub fn list_entity_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn get_fields(&self, name: &str) -> Option<&[FieldSpec]> {
        self.entities.get(name).map(|entity| entity.fields.as_slice())
    }

    pub fn table_name_override(&self, name: &str) -> Option<&str> {
        self.entities
            .get(name)
            .and_then(|entity| entity.table_name.as_deref())
    }

    pub fn readable_entities(&self) -> Vec<String> {
        self.names_supporting(EntityOperation::Read)
    }

    pub fn writable_entities(&self) -> Vec<String> {
        self.names_supporting(EntityOperation::Write)
    }

    fn names_supporting(&self, operation: EntityOperation) -> Vec<String> {
        self.all_entities()
            .into_iter()
            .filter(|entity| entity.supports(operation))
            .map(|entity| entity.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn parse_document(content: &str) -> Result<RegistryDocument, String> {
    match serde_json::from_str::<RegistryDocument>(content) {
        Ok(document) => Ok(document),
        Err(json_err) => serde_yaml::from_str::<RegistryDocument>(content)
            .map_err(|yaml_err| format!("not JSON ({}) nor YAML ({})", json_err, yaml_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const JSON_DESCRIPTOR: &str = r#"{
        "entities": [
            {
                "name": "TaskEntity",
                "description": "To-do items",
                "fields": [
                    {"name": "title", "type": "TEXT"},
                    {"name": "priority", "type": "INTEGER", "default": 2}
                ],
                "operations": ["read", "write"]
            },
            {
                "name": "AuditEntity",
                "table_name": "audit_log",
                "fields": [{"name": "message"}],
                "operations": ["read"]
            }
        ]
    }"#;

    const YAML_DESCRIPTOR: &str = r#"
entities:
  - name: NoteEntity
    fields:
      - name: body
        type: TEXT
    operations: [write]
"#;

    #[test]
    fn test_load_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entity_registry.json");
        std::fs::write(&path, JSON_DESCRIPTOR).unwrap();

        let registry = EntityRegistry::load(&path);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_entity_names(), vec!["TaskEntity", "AuditEntity"]);
        assert_eq!(registry.source(), Some(path.as_path()));

        let fields = registry.get_fields("TaskEntity").unwrap();
        assert_eq!(fields[1].name, "priority");
        assert_eq!(fields[1].default, Some(json!(2)));

        // Missing type keyword falls back to TEXT
        assert_eq!(registry.get_fields("AuditEntity").unwrap()[0].field_type, "TEXT");
        assert_eq!(registry.table_name_override("AuditEntity"), Some("audit_log"));
        assert_eq!(registry.table_name_override("TaskEntity"), None);
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entities.yaml");
        std::fs::write(&path, YAML_DESCRIPTOR).unwrap();

        let registry = EntityRegistry::load(&path);
        assert_eq!(registry.list_entity_names(), vec!["NoteEntity"]);
        assert_eq!(registry.writable_entities(), vec!["NoteEntity"]);
        assert!(registry.readable_entities().is_empty());
    }

    #[test]
    fn test_operation_filters() {
        let registry = EntityRegistry::from_descriptor_str(JSON_DESCRIPTOR);
        assert_eq!(registry.readable_entities(), vec!["TaskEntity", "AuditEntity"]);
        assert_eq!(registry.writable_entities(), vec!["TaskEntity"]);
    }

    #[test]
    fn test_unknown_operations_are_ignored() {
        let registry = EntityRegistry::from_descriptor_str(
            r#"{
                "entities": [
                    {
                        "name": "TimerReminderEntity",
                        "fields": [{"name": "minute_cycle", "type": "INTEGER"}],
                        "operations": ["read", "write"]
                    },
                    {
                        "name": "ArchiveEntity",
                        "fields": [{"name": "label"}],
                        "operations": ["read", "delete", 7, "READ"]
                    }
                ]
            }"#,
        );

        assert_eq!(
            registry.list_entity_names(),
            vec!["TimerReminderEntity", "ArchiveEntity"]
        );
        assert_eq!(registry.get_fields("TimerReminderEntity").unwrap().len(), 1);
        let archive = registry.get_entity("ArchiveEntity").unwrap();
        assert_eq!(archive.operations, vec![EntityOperation::Read]);
        assert_eq!(registry.writable_entities(), vec!["TimerReminderEntity"]);
    }

    #[test]
    fn test_unknown_operations_in_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entities.yml");
        std::fs::write(
            &path,
            "entities:\n  - name: NoteEntity\n    fields:\n      - name: body\n    operations: [write, purge]\n",
        )
        .unwrap();

        let registry = EntityRegistry::load(&path);
        assert_eq!(registry.writable_entities(), vec!["NoteEntity"]);
    }

    #[test]
    fn test_missing_file_is_empty_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let registry = EntityRegistry::load(temp_dir.path().join("nope.json"));
        assert!(registry.is_empty());
        assert!(registry.get_entity("TaskEntity").is_none());
        assert!(registry.get_fields("TaskEntity").is_none());
    }

    #[test]
    fn test_malformed_file_is_empty_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entity_registry.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let registry = EntityRegistry::load(&path);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_nameless_entities_are_skipped() {
        let registry = EntityRegistry::from_entities(vec![
            EntityDescriptor {
                name: String::new(),
                fields: vec![],
                operations: vec![],
                table_name: None,
                description: None,
            },
            EntityDescriptor {
                name: "Kept".to_string(),
                fields: vec![FieldSpec::new("a", "TEXT").with_default("x")],
                operations: vec![EntityOperation::Read],
                table_name: None,
                description: None,
            },
        ]);
        assert_eq!(registry.list_entity_names(), vec!["Kept"]);
    }

    #[test]
    fn test_install_default_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("entity_registry.json");

        assert!(EntityRegistry::install_default(&path).unwrap());
        assert!(!EntityRegistry::install_default(&path).unwrap());

        let registry = EntityRegistry::load(&path);
        assert_eq!(registry.list_entity_names()[0], "TimerReminderEntity");
        assert_eq!(registry.get_fields("TimerReminderEntity").unwrap().len(), 5);
    }
}

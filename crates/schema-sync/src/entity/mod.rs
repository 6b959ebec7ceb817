//! Entity metadata boundary.
//!
//! Entity descriptors are the read-only view of application entity
//! definitions the desired schema is derived from. They are plain data so
//! callers can produce them from reflection, code generation or a file.

mod builder;

pub use builder::build_desired_schema;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{DbType, DefaultValue, UNBOUNDED};
use crate::error::{Result, SyncError};

fn default_size() -> i32 {
    UNBOUNDED
}

fn default_true() -> bool {
    true
}

/// Persistent field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column name in the database.
    pub native_name: String,

    /// Friendly name (default: native name).
    #[serde(default)]
    pub name: Option<String>,

    pub db_type: DbType,

    /// Length for sized types (default: -1, unbounded).
    #[serde(default = "default_size")]
    pub size: i32,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub key: bool,

    #[serde(default)]
    pub large: bool,

    #[serde(default)]
    pub auto_increment: bool,

    #[serde(default)]
    pub default: Option<DefaultValue>,

    /// Field contributed by an extension rather than the entity itself.
    /// Extension fields take no part in schema generation.
    #[serde(default)]
    pub extended: bool,

    /// Enumeration type backing the column, if any.
    #[serde(default)]
    pub enumeration_type_name: Option<String>,
}

impl FieldDescriptor {
    pub fn new(native_name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            native_name: native_name.into(),
            name: None,
            db_type,
            size: UNBOUNDED,
            nullable: false,
            key: false,
            large: false,
            auto_increment: false,
            default: None,
            extended: false,
            enumeration_type_name: None,
        }
    }

    pub fn size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Index declared on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub native_name: String,

    /// Key field native names, in order.
    pub fields: Vec<String>,

    #[serde(default)]
    pub included_fields: Vec<String>,

    #[serde(default)]
    pub computed_fields: Vec<String>,

    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new<I, S>(native_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            native_name: native_name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            included_fields: Vec::new(),
            computed_fields: Vec::new(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Child-to-parent link declared on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    /// Foreign key constraint name.
    pub native_name: String,

    /// Entity name of the parent.
    pub target: String,

    /// Local field native names, in order.
    pub fields: Vec<String>,
}

impl LinkDescriptor {
    pub fn new<I, S>(native_name: impl Into<String>, target: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            native_name: native_name.into(),
            target: target.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity identifier, unique within a registry (case-insensitive).
    pub name: String,

    /// Table name in the database.
    pub native_table_name: String,

    /// Friendly table name (default: entity name).
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,

    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,

    #[serde(default)]
    pub links: Vec<LinkDescriptor>,

    /// Exclude the entity from every synchronization run.
    #[serde(default)]
    pub skip_migration: bool,

    /// Secondary database holding the entity (default: the main database).
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_true")]
    pub generate: bool,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, native_table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_table_name: native_table_name.into(),
            display_name: None,
            fields: Vec::new(),
            indexes: Vec::new(),
            links: Vec::new(),
            skip_migration: false,
            database: None,
            generate: true,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn link(mut self, link: LinkDescriptor) -> Self {
        self.links.push(link);
        self
    }

    pub fn skip_migration(mut self) -> Self {
        self.skip_migration = true;
        self
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Whether the entity lives in `database` (`None` = main database).
    pub fn targets(&self, database: Option<&str>) -> bool {
        match (&self.database, database) {
            (None, None) => true,
            (Some(own), Some(wanted)) => own.eq_ignore_ascii_case(wanted),
            _ => false,
        }
    }
}

/// Ordered, case-insensitive collection of entity descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRegistry {
    entities: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load descriptors from a YAML file, or JSON when the extension is `.json`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let entities: Vec<EntityDescriptor> = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Self::from_descriptors(entities)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let entities: Vec<EntityDescriptor> = serde_yaml::from_str(yaml)?;
        Self::from_descriptors(entities)
    }

    pub fn from_descriptors(entities: impl IntoIterator<Item = EntityDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for entity in entities {
            registry.register(entity)?;
        }
        Ok(registry)
    }

    /// Add a descriptor. Fails on an empty or duplicate entity name.
    pub fn register(&mut self, entity: EntityDescriptor) -> Result<()> {
        if entity.name.trim().is_empty() {
            return Err(SyncError::InvalidInput("Entity without a name".to_string()));
        }
        if entity.native_table_name.trim().is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "Entity {} has no native table name",
                entity.name
            )));
        }
        if self.get(&entity.name).is_some() {
            return Err(SyncError::duplicate("Entity", entity.name, "registry"));
        }
        debug!("Registered entity {} -> {}", entity.name, entity.native_table_name);
        self.entities.push(entity);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities taking part in a run, in registration order.
    ///
    /// An empty `subset` selects every entity. Unknown names in the subset
    /// are an input error. Entities marked `skip_migration` or living in a
    /// different database are left out.
    pub fn select(&self, subset: &[String], database: Option<&str>) -> Result<Vec<&EntityDescriptor>> {
        for name in subset {
            if self.get(name).is_none() {
                return Err(SyncError::InvalidInput(format!("Unknown entity: {}", name)));
            }
        }

        let selected: Vec<&EntityDescriptor> = self
            .entities
            .iter()
            .filter(|e| subset.is_empty() || subset.iter().any(|s| s.eq_ignore_ascii_case(&e.name)))
            .filter(|e| !e.skip_migration)
            .filter(|e| e.targets(database))
            .collect();

        debug!(
            "Selected {} of {} entities (database: {})",
            selected.len(),
            self.entities.len(),
            database.unwrap_or("default")
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::from_descriptors([
            EntityDescriptor::new("Customer", "Customers"),
            EntityDescriptor::new("Order", "Orders"),
            EntityDescriptor::new("Legacy", "LegacyRows").skip_migration(),
            EntityDescriptor::new("Event", "Events").in_database("Archive"),
        ])
        .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        let err = registry
            .register(EntityDescriptor::new("customer", "Other"))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateMember { .. }));

        let err = registry
            .register(EntityDescriptor::new("", "Other"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[test]
    fn test_select_full_run() {
        let registry = registry();
        let names: Vec<&str> = registry
            .select(&[], None)
            .unwrap()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Customer", "Order"]);
    }

    #[test]
    fn test_select_subset_and_database() {
        let registry = registry();
        let selected = registry.select(&["order".to_string()], None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].native_table_name, "Orders");

        let archive = registry.select(&[], Some("ARCHIVE")).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].name, "Event");

        let err = registry.select(&["Invoice".to_string()], None).unwrap_err();
        assert!(err.to_string().contains("Invoice"));
    }

    #[test]
    fn test_from_yaml_defaults() {
        let yaml = r#"
- name: Customer
  native_table_name: Customers
  fields:
    - native_name: Id
      db_type: Int32
      key: true
    - native_name: Name
      db_type: String
      size: 100
"#;
        let registry = EntityRegistry::from_yaml(yaml).unwrap();
        let customer = registry.get("customer").unwrap();
        assert!(customer.generate);
        assert_eq!(customer.fields[0].size, UNBOUNDED);
        assert_eq!(customer.fields[1].size, 100);
        assert!(customer.fields[0].key);
    }
}

//! Persisted schema document for merge and round-tripping.
//!
//! The document mirrors the schema model with PascalCase element names
//! (`Tables`, `NativeName`, `ChildToParentLinks`, ...). Every attribute other
//! than native names is optional so a hand-edited document only needs to
//! carry the overrides it cares about.
//!
//! Merging onto an empty schema builds the whole structure from the
//! document. Merging onto an introspected schema only applies user-authored
//! overrides (display names, generation flags, modifiers, enumeration
//! hints); the structural facts stay with the introspected schema.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::schema::{Column, ForeignKeyLink, Index, Procedure, Schema, Table};
use super::types::{ColumnFlags, DbType, DefaultValue, Visibility, UNBOUNDED};
use crate::error::{Result, SyncError};

/// Root of a persisted schema document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaDocument {
    #[serde(default)]
    pub tables: Vec<TableElement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub procedures: Vec<ProcedureElement>,
}

/// Table element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableElement {
    pub native_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Visibility>,

    #[serde(default)]
    pub columns: Vec<ColumnElement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexElement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_to_parent_links: Vec<LinkElement>,
}

/// Column element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnElement {
    pub native_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<DbType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<ColumnFlags>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumeration_type_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Visibility>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

/// Index element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexElement {
    pub native_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_columns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed_columns: Vec<String>,

    #[serde(default)]
    pub unique: bool,
}

/// Child-to-parent link element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkElement {
    pub native_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    #[serde(default)]
    pub parent_table: String,

    #[serde(default)]
    pub columns: Vec<String>,
}

/// Stored-procedure element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcedureElement {
    pub native_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<bool>,

    #[serde(default)]
    pub body: String,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl SchemaDocument {
    /// Load a document from a YAML file, or JSON when the extension is `.json`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if is_json(path) {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Save the document, choosing the format from the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            self.to_json()?
        } else {
            self.to_yaml()?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Capture every attribute of `schema`.
    pub fn from_schema(schema: &Schema) -> Self {
        let tables = schema
            .tables()
            .iter()
            .map(|table| TableElement {
                native_name: table.native_name.clone(),
                name: Some(table.name.clone()),
                generate: Some(table.generate),
                modifiers: Some(table.modifiers),
                columns: table
                    .columns()
                    .iter()
                    .map(|c| ColumnElement {
                        native_name: c.native_name.clone(),
                        name: Some(c.name.clone()),
                        generate: Some(c.generate),
                        db_type: Some(c.db_type),
                        flags: Some(c.flags),
                        length: Some(c.length),
                        enumeration_type_name: c.enumeration_type_name.clone(),
                        modifiers: Some(c.modifiers),
                        default: c.default.clone(),
                    })
                    .collect(),
                indexes: table
                    .indexes()
                    .iter()
                    .map(|i| IndexElement {
                        native_name: i.native_name.clone(),
                        name: Some(i.name.clone()),
                        generate: Some(i.generate),
                        columns: i.columns.clone(),
                        included_columns: i.included_columns.clone(),
                        computed_columns: i.computed_columns.clone(),
                        unique: i.unique,
                    })
                    .collect(),
                child_to_parent_links: table
                    .links_to_parents()
                    .iter()
                    .map(|l| LinkElement {
                        native_name: l.native_name.clone(),
                        name: Some(l.name.clone()),
                        generate: Some(l.generate),
                        parent_table: l.parent_table.clone(),
                        columns: l.columns.clone(),
                    })
                    .collect(),
            })
            .collect();

        let procedures = schema
            .procedures()
            .iter()
            .map(|p| ProcedureElement {
                native_name: p.native_name.clone(),
                name: Some(p.name.clone()),
                generate: Some(p.generate),
                body: p.body.clone(),
            })
            .collect();

        Self { tables, procedures }
    }

    /// Build a fresh schema from the document alone.
    pub fn to_schema(&self) -> Result<Schema> {
        let mut schema = Schema::new();
        self.merge_into(&mut schema)?;
        Ok(schema)
    }

    /// Merge the document onto `schema`, then run fixup.
    ///
    /// Tables absent from `schema` are created from the document. Tables
    /// already present only receive overrides; members the document knows
    /// but the schema lacks are ignored.
    pub fn merge_into(&self, schema: &mut Schema) -> Result<()> {
        let mut created = 0;
        let mut merged = 0;

        for element in &self.tables {
            if element.native_name.trim().is_empty() {
                return Err(SyncError::InvalidInput(
                    "Table element without NativeName".to_string(),
                ));
            }
            match schema.table_mut(&element.native_name) {
                Some(table) => {
                    element.apply_overrides(table);
                    merged += 1;
                }
                None => {
                    schema.add_table(element.build()?)?;
                    created += 1;
                }
            }
        }

        for element in &self.procedures {
            let exists = schema
                .procedures()
                .iter()
                .any(|p| p.native_name.eq_ignore_ascii_case(&element.native_name));
            if !exists {
                let mut procedure = Procedure::new(&element.native_name, &element.body);
                if let Some(name) = &element.name {
                    procedure.name = name.clone();
                }
                if let Some(generate) = element.generate {
                    procedure.generate = generate;
                }
                schema.add_procedure(procedure)?;
            }
        }

        schema.fixup();
        info!(
            "Merged schema document: {} tables created, {} tables overridden",
            created, merged
        );
        Ok(())
    }
}

impl TableElement {
    fn apply_overrides(&self, table: &mut Table) {
        if let Some(name) = &self.name {
            table.name = name.clone();
        }
        if let Some(generate) = self.generate {
            table.generate = generate;
        }
        if let Some(modifiers) = self.modifiers {
            table.modifiers = modifiers;
        }

        for element in &self.columns {
            match table.column_mut(&element.native_name) {
                Some(column) => {
                    if let Some(name) = &element.name {
                        column.name = name.clone();
                    }
                    if let Some(generate) = element.generate {
                        column.generate = generate;
                    }
                    if let Some(modifiers) = element.modifiers {
                        column.modifiers = modifiers;
                    }
                    if element.enumeration_type_name.is_some() {
                        column.enumeration_type_name = element.enumeration_type_name.clone();
                    }
                }
                None => debug!(
                    "Ignoring document column {}.{} absent from schema",
                    table.native_name, element.native_name
                ),
            }
        }

        for element in &self.indexes {
            if let Some(index) = table
                .indexes_mut()
                .iter_mut()
                .find(|i| i.native_name.eq_ignore_ascii_case(&element.native_name))
            {
                if let Some(name) = &element.name {
                    index.name = name.clone();
                }
                if let Some(generate) = element.generate {
                    index.generate = generate;
                }
            }
        }

        for element in &self.child_to_parent_links {
            if let Some(link) = table
                .links_to_parents_mut()
                .iter_mut()
                .find(|l| l.native_name.eq_ignore_ascii_case(&element.native_name))
            {
                if let Some(name) = &element.name {
                    link.name = name.clone();
                }
                if let Some(generate) = element.generate {
                    link.generate = generate;
                }
            }
        }
    }

    fn build(&self) -> Result<Table> {
        let mut table = Table::new(&self.native_name);
        self.apply_overrides(&mut table);

        for element in &self.columns {
            let db_type = element.db_type.ok_or_else(|| {
                SyncError::Structural(format!(
                    "Column {}.{} has no DbType",
                    self.native_name, element.native_name
                ))
            })?;
            let mut column = Column::new(&element.native_name, db_type);
            column.length = element.length.unwrap_or(UNBOUNDED);
            column.flags = element.flags.unwrap_or_default();
            column.default = element.default.clone();
            column.enumeration_type_name = element.enumeration_type_name.clone();
            if let Some(name) = &element.name {
                column.name = name.clone();
            }
            if let Some(generate) = element.generate {
                column.generate = generate;
            }
            if let Some(modifiers) = element.modifiers {
                column.modifiers = modifiers;
            }
            table.add_column(column)?;
        }

        for element in &self.indexes {
            let mut index = Index::new(&element.native_name, element.columns.iter().cloned())
                .include(element.included_columns.iter().cloned())
                .computed(element.computed_columns.iter().cloned());
            index.unique = element.unique;
            if let Some(name) = &element.name {
                index.name = name.clone();
            }
            if let Some(generate) = element.generate {
                index.generate = generate;
            }
            table.add_index(index)?;
        }

        for element in &self.child_to_parent_links {
            let mut link = ForeignKeyLink::new(
                &element.native_name,
                &element.parent_table,
                element.columns.iter().cloned(),
            );
            if let Some(name) = &element.name {
                link.name = name.clone();
            }
            if let Some(generate) = element.generate {
                link.generate = generate;
            }
            table.add_link(link)?;
        }

        Ok(table)
    }
}

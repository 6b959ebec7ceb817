//! Actual-schema loading.
//!
//! A [`CatalogReader`] produces the schema that currently exists in the target
//! database. Connecting to a live database is left to implementations outside
//! this crate; they typically query the catalog views and hand the rows to
//! [`schema_from_rows`].

pub mod rows;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::{Schema, SchemaDocument};
use crate::error::Result;

pub use rows::{
    classify_common_columns, parse_default, schema_from_rows, CatalogColumnRow,
    COMMON_SIZE_THRESHOLD, DEFAULT_SCHEMA,
};

/// Restricts which tables a catalog read returns.
///
/// Empty lists mean "no constraint". Names compare case-insensitively.
///
/// Native table names are `table` for tables in the default schema and
/// `schema.table` everywhere else. Without a default schema every name is
/// qualified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub table_names: Vec<String>,
    pub schema_names: Vec<String>,
    pub default_schema: Option<String>,
}

impl CatalogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_names = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema_names = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Whether a table passes the filter. A table without a schema qualifier
    /// belongs to the default schema; with no default schema it only passes
    /// when no schema constraint is set.
    pub fn accepts(&self, schema: Option<&str>, table: &str) -> bool {
        let table_ok = self.table_names.is_empty()
            || self.table_names.iter().any(|t| t.eq_ignore_ascii_case(table));
        let schema_ok = self.schema_names.is_empty()
            || schema
                .or(self.default_schema.as_deref())
                .map(|s| self.schema_names.iter().any(|n| n.eq_ignore_ascii_case(s)))
                .unwrap_or(false);
        table_ok && schema_ok
    }

    /// Native name for `table` in database schema `schema`.
    pub fn native_table_name(&self, schema: &str, table: &str) -> String {
        match &self.default_schema {
            Some(default) if default.eq_ignore_ascii_case(schema) => table.to_string(),
            _ => format!("{}.{}", schema, table),
        }
    }

    /// Apply the filter to a native table name of the form `schema.table` or
    /// `table`.
    pub fn accepts_native(&self, native_name: &str) -> bool {
        match native_name.split_once('.') {
            Some((schema, table)) => self.accepts(Some(schema), table),
            None => self.accepts(None, native_name),
        }
    }
}

/// Source of the actual schema.
pub trait CatalogReader {
    /// Load the actual schema, restricted by `filter`. The result is fixed up.
    fn load_schema(&self, filter: &CatalogFilter) -> Result<Schema>;

    /// Reader name for logging.
    fn name(&self) -> &str;
}

/// Catalog for a database that does not exist yet.
///
/// Used by create mode: every desired table becomes a `CreateTable` unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl CatalogReader for EmptyCatalog {
    fn load_schema(&self, _filter: &CatalogFilter) -> Result<Schema> {
        Ok(Schema::new())
    }

    fn name(&self) -> &str {
        "empty"
    }
}

/// Catalog backed by a persisted schema document.
#[derive(Debug, Clone)]
pub struct DocumentCatalog {
    document: SchemaDocument,
    source: Option<PathBuf>,
}

impl DocumentCatalog {
    pub fn new(document: SchemaDocument) -> Self {
        Self {
            document,
            source: None,
        }
    }

    /// Read the document at `path` (YAML, or JSON for `.json`).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let document = SchemaDocument::load(path)?;
        Ok(Self {
            document,
            source: Some(path.to_path_buf()),
        })
    }

    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }
}

impl CatalogReader for DocumentCatalog {
    fn load_schema(&self, filter: &CatalogFilter) -> Result<Schema> {
        let mut schema = self.document.to_schema()?;

        let rejected: Vec<String> = schema
            .tables()
            .iter()
            .filter(|t| !filter.accepts_native(&t.native_name))
            .map(|t| t.native_name.clone())
            .collect();
        for name in &rejected {
            schema.remove_table(name);
        }
        if !rejected.is_empty() {
            schema.fixup();
        }

        info!(
            "Loaded actual schema from {}: {} tables",
            self.source
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "document".to_string()),
            schema.tables().len()
        );
        Ok(schema)
    }

    fn name(&self) -> &str {
        "document"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
Tables:
  - NativeName: Customers
    Columns:
      - NativeName: Id
        DbType: Int32
        Flags:
          Key: true
  - NativeName: audit.Events
    Columns:
      - NativeName: Id
        DbType: Int64
"#;

    #[test]
    fn test_filter_accepts() {
        let filter = CatalogFilter::new().with_tables(["customers"]);
        assert!(filter.accepts(None, "Customers"));
        assert!(!filter.accepts(None, "Orders"));

        let filter = CatalogFilter::new().with_schemas(["dbo"]);
        assert!(filter.accepts_native("dbo.Orders"));
        assert!(!filter.accepts_native("Orders"));
        assert!(!filter.accepts_native("audit.Orders"));

        assert!(CatalogFilter::default().accepts_native("anything"));
    }

    #[test]
    fn test_filter_default_schema() {
        let filter = CatalogFilter::new()
            .with_schemas(["dbo"])
            .with_default_schema("DBO");
        assert!(filter.accepts_native("Orders"));
        assert!(filter.accepts_native("dbo.Orders"));
        assert!(!filter.accepts_native("audit.Orders"));

        assert_eq!(filter.native_table_name("dbo", "Orders"), "Orders");
        assert_eq!(filter.native_table_name("audit", "Orders"), "audit.Orders");
        assert_eq!(
            CatalogFilter::default().native_table_name("dbo", "Orders"),
            "dbo.Orders"
        );
    }

    #[test]
    fn test_empty_catalog() {
        let schema = EmptyCatalog.load_schema(&CatalogFilter::default()).unwrap();
        assert!(schema.is_empty());
    }

    #[test]
    fn test_document_catalog_filters_tables() {
        let catalog = DocumentCatalog::new(SchemaDocument::from_yaml(DOC).unwrap());

        let all = catalog.load_schema(&CatalogFilter::default()).unwrap();
        assert_eq!(all.tables().len(), 2);

        let audit = catalog
            .load_schema(&CatalogFilter::new().with_schemas(["AUDIT"]))
            .unwrap();
        assert_eq!(audit.tables().len(), 1);
        assert!(audit.table("audit.Events").is_some());
    }

    #[test]
    fn test_document_catalog_from_missing_path() {
        let err = DocumentCatalog::from_path("/definitely/not/here.yaml").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_IO_ERROR);
    }
}

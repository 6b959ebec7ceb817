//! Schema element model: tables, columns, indexes, links and procedures.
//!
//! Every element carries a native name (its identity in the database,
//! compared case-insensitively) and a display name used by generated code.
//! Display names are only guaranteed unique after [`Schema::fixup`] runs.

use serde::{Deserialize, Serialize};

use super::types::{ColumnFlags, DbType, DefaultValue, Visibility, UNBOUNDED};
use crate::error::{Result, SyncError};

/// Case-insensitive native-name comparison.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Compare two name lists element-wise, case-insensitively.
fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_name(x, y))
}

/// Lower-cased, sorted copy of a name list.
fn sorted_names(names: &[String]) -> Vec<String> {
    let mut sorted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    sorted.sort();
    sorted
}

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SyncError::InvalidInput(format!("{} name is required", kind)));
    }
    Ok(())
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name in the database.
    pub native_name: String,

    /// Display name.
    pub name: String,

    /// Scalar kind.
    pub db_type: DbType,

    /// Maximum length for sized types ([`UNBOUNDED`] for max / not applicable).
    pub length: i32,

    pub flags: ColumnFlags,

    /// Default-value expression.
    pub default: Option<DefaultValue>,

    /// Enumeration type the column's values come from, if any.
    pub enumeration_type_name: Option<String>,

    /// Ordinal position (0-based), assigned by fixup.
    pub ordinal: usize,

    /// Whether code is generated for this column.
    pub generate: bool,

    pub modifiers: Visibility,
}

impl Column {
    /// Create a non-nullable, unbounded column whose display name equals its native name.
    pub fn new(native_name: impl Into<String>, db_type: DbType) -> Self {
        let native_name = native_name.into();
        Self {
            name: native_name.clone(),
            native_name,
            db_type,
            length: UNBOUNDED,
            flags: ColumnFlags::default(),
            default: None,
            enumeration_type_name: None,
            ordinal: 0,
            generate: true,
            modifiers: Visibility::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn length(mut self, length: i32) -> Self {
        self.length = length;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.flags.nullable = true;
        self
    }

    /// Mark as key column. Key columns are never nullable.
    pub fn key(mut self) -> Self {
        self.flags.key = true;
        self.flags.nullable = false;
        self
    }

    pub fn large(mut self) -> Self {
        self.flags.large = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.flags.auto_increment = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_key(&self) -> bool {
        self.flags.key
    }

    /// Effective nullability; key columns are always non-nullable.
    pub fn is_nullable(&self) -> bool {
        self.flags.nullable && !self.flags.key
    }

    /// Whether the column is large/BLOB-class.
    ///
    /// Explicitly flagged columns, always-large types, and unbounded
    /// text/binary columns all count.
    pub fn is_large(&self) -> bool {
        self.flags.large
            || self.db_type.is_always_large()
            || (self.db_type.is_sized() && self.length == UNBOUNDED)
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name in the database.
    pub native_name: String,

    /// Display name.
    pub name: String,

    /// Key column native names, in key order.
    pub columns: Vec<String>,

    /// Included (non-key) column native names.
    pub included_columns: Vec<String>,

    /// Computed column native names.
    pub computed_columns: Vec<String>,

    pub unique: bool,

    /// Ordinal position (0-based), assigned by fixup.
    pub ordinal: usize,

    pub generate: bool,
}

impl Index {
    pub fn new<I, S>(native_name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let native_name = native_name.into();
        Self {
            name: native_name.clone(),
            native_name,
            columns: columns.into_iter().map(Into::into).collect(),
            included_columns: Vec::new(),
            computed_columns: Vec::new(),
            unique: false,
            ordinal: 0,
            generate: true,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn include<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn computed<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.computed_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Structural equality used by the diff engine.
    ///
    /// Each of the three column lists is sorted by lower-cased native name
    /// before comparison, so `(A, B)` matches `(B, A)`. Uniqueness is not
    /// part of the comparison.
    pub fn matches(&self, other: &Index) -> bool {
        sorted_names(&self.columns) == sorted_names(&other.columns)
            && sorted_names(&self.included_columns) == sorted_names(&other.included_columns)
            && sorted_names(&self.computed_columns) == sorted_names(&other.computed_columns)
    }

    /// Whether any of the index's column lists mention `column`.
    pub fn references(&self, column: &str) -> bool {
        self.columns
            .iter()
            .chain(&self.included_columns)
            .chain(&self.computed_columns)
            .any(|c| same_name(c, column))
    }
}

/// Foreign-key link from the owning (child) table to a parent table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyLink {
    /// Constraint name in the database.
    pub native_name: String,

    /// Display name. Empty until fixup defaults it to the parent table's name.
    pub name: String,

    /// Native name of the referenced table.
    pub parent_table: String,

    /// Local column native names forming the link, in order.
    pub columns: Vec<String>,

    pub generate: bool,
}

impl ForeignKeyLink {
    pub fn new<I, S>(native_name: impl Into<String>, parent_table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            native_name: native_name.into(),
            name: String::new(),
            parent_table: parent_table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            generate: true,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Same parent and same ordered column list.
    pub fn matches(&self, other: &ForeignKeyLink) -> bool {
        same_name(&self.parent_table, &other.parent_table) && same_names(&self.columns, &other.columns)
    }

    pub fn references(&self, column: &str) -> bool {
        self.columns.iter().any(|c| same_name(c, column))
    }

    /// A link is supported only when its parent table is part of `schema`.
    pub fn is_supported(&self, schema: &Schema) -> bool {
        schema.table(&self.parent_table).is_some()
    }
}

/// Reverse reference: a link on another table that points at this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedLink {
    /// Native name of the child table owning the link.
    pub child_table: String,

    /// Native name of the link.
    pub link: String,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name in the database (identity, case-insensitive).
    pub native_name: String,

    /// Display name.
    pub name: String,

    /// Column definitions, in declaration order.
    columns: Vec<Column>,

    /// Index definitions.
    indexes: Vec<Index>,

    /// Outgoing foreign-key links.
    links_to_parents: Vec<ForeignKeyLink>,

    /// Incoming links, rebuilt by fixup.
    #[serde(skip)]
    associated_links: Vec<AssociatedLink>,

    /// Whether code is generated for this table.
    pub generate: bool,

    pub modifiers: Visibility,
}

impl Table {
    pub fn new(native_name: impl Into<String>) -> Self {
        let native_name = native_name.into();
        Self {
            name: native_name.clone(),
            native_name,
            columns: Vec::new(),
            indexes: Vec::new(),
            links_to_parents: Vec::new(),
            associated_links: Vec::new(),
            generate: true,
            modifiers: Visibility::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn indexes_mut(&mut self) -> &mut [Index] {
        &mut self.indexes
    }

    pub fn links_to_parents(&self) -> &[ForeignKeyLink] {
        &self.links_to_parents
    }

    pub fn links_to_parents_mut(&mut self) -> &mut [ForeignKeyLink] {
        &mut self.links_to_parents
    }

    pub fn associated_links(&self) -> &[AssociatedLink] {
        &self.associated_links
    }

    pub(crate) fn set_associated_links(&mut self, links: Vec<AssociatedLink>) {
        self.associated_links = links;
    }

    pub fn column(&self, native_name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| same_name(&c.native_name, native_name))
    }

    pub fn column_mut(&mut self, native_name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| same_name(&c.native_name, native_name))
    }

    pub fn index(&self, native_name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| same_name(&i.native_name, native_name))
    }

    pub fn link(&self, native_name: &str) -> Option<&ForeignKeyLink> {
        self.links_to_parents
            .iter()
            .find(|l| same_name(&l.native_name, native_name))
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_key())
    }

    /// Append a column. Fails if a column with the same native name exists.
    pub fn add_column(&mut self, mut column: Column) -> Result<()> {
        require_name("Column", &column.native_name)?;
        if self.column(&column.native_name).is_some() {
            return Err(SyncError::duplicate("Column", column.native_name, &self.native_name));
        }
        column.ordinal = self.columns.len();
        self.columns.push(column);
        Ok(())
    }

    /// Append an index. Every listed column must exist on the table.
    pub fn add_index(&mut self, mut index: Index) -> Result<()> {
        require_name("Index", &index.native_name)?;
        if self.index(&index.native_name).is_some() {
            return Err(SyncError::duplicate("Index", index.native_name, &self.native_name));
        }
        if index.columns.is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "Index {} on {} has no key columns",
                index.native_name, self.native_name
            )));
        }
        for column in index
            .columns
            .iter()
            .chain(&index.included_columns)
            .chain(&index.computed_columns)
        {
            if self.column(column).is_none() {
                return Err(SyncError::unknown_column(&self.native_name, column));
            }
        }
        index.ordinal = self.indexes.len();
        self.indexes.push(index);
        Ok(())
    }

    /// Append an outgoing link. Every link column must exist on the table.
    pub fn add_link(&mut self, link: ForeignKeyLink) -> Result<()> {
        require_name("Link", &link.native_name)?;
        require_name("Parent table", &link.parent_table)?;
        if self.link(&link.native_name).is_some() {
            return Err(SyncError::duplicate("Link", link.native_name, &self.native_name));
        }
        if link.columns.is_empty() {
            return Err(SyncError::InvalidInput(format!(
                "Link {} on {} has no columns",
                link.native_name, self.native_name
            )));
        }
        for column in &link.columns {
            if self.column(column).is_none() {
                return Err(SyncError::unknown_column(&self.native_name, column));
            }
        }
        self.links_to_parents.push(link);
        Ok(())
    }

    pub fn remove_index(&mut self, native_name: &str) -> Option<Index> {
        let pos = self
            .indexes
            .iter()
            .position(|i| same_name(&i.native_name, native_name))?;
        Some(self.indexes.remove(pos))
    }

    pub fn remove_link(&mut self, native_name: &str) -> Option<ForeignKeyLink> {
        let pos = self
            .links_to_parents
            .iter()
            .position(|l| same_name(&l.native_name, native_name))?;
        Some(self.links_to_parents.remove(pos))
    }
}

/// Stored-procedure definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub native_name: String,
    pub name: String,
    /// Procedure body text.
    pub body: String,
    pub generate: bool,
}

impl Procedure {
    pub fn new(native_name: impl Into<String>, body: impl Into<String>) -> Self {
        let native_name = native_name.into();
        Self {
            name: native_name.clone(),
            native_name,
            body: body.into(),
            generate: true,
        }
    }
}

/// Root aggregate: tables and stored procedures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    tables: Vec<Table>,
    procedures: Vec<Procedure>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.procedures.is_empty()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [Table] {
        &mut self.tables
    }

    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    pub(crate) fn procedures_mut(&mut self) -> &mut [Procedure] {
        &mut self.procedures
    }

    pub fn table(&self, native_name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| same_name(&t.native_name, native_name))
    }

    pub fn table_mut(&mut self, native_name: &str) -> Option<&mut Table> {
        self.tables
            .iter_mut()
            .find(|t| same_name(&t.native_name, native_name))
    }

    /// Look up a table, failing with [`SyncError::UnknownTable`].
    pub fn require_table(&self, native_name: &str) -> Result<&Table> {
        self.table(native_name)
            .ok_or_else(|| SyncError::UnknownTable(native_name.to_string()))
    }

    pub fn require_table_mut(&mut self, native_name: &str) -> Result<&mut Table> {
        self.table_mut(native_name)
            .ok_or_else(|| SyncError::UnknownTable(native_name.to_string()))
    }

    /// Add a table. Fails if a table with the same native name exists.
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        require_name("Table", &table.native_name)?;
        if self.table(&table.native_name).is_some() {
            return Err(SyncError::duplicate("Table", table.native_name, "schema"));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn remove_table(&mut self, native_name: &str) -> Option<Table> {
        let pos = self
            .tables
            .iter()
            .position(|t| same_name(&t.native_name, native_name))?;
        Some(self.tables.remove(pos))
    }

    pub fn add_procedure(&mut self, procedure: Procedure) -> Result<()> {
        require_name("Procedure", &procedure.native_name)?;
        if self
            .procedures
            .iter()
            .any(|p| same_name(&p.native_name, &procedure.native_name))
        {
            return Err(SyncError::duplicate("Procedure", procedure.native_name, "schema"));
        }
        self.procedures.push(procedure);
        Ok(())
    }
}

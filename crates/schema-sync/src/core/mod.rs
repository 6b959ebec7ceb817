//! Relational schema model shared by the desired and actual sides of a sync.
//!
//! - [`types`]: scalar kinds, column flags and default expressions
//! - [`schema`]: tables, columns, indexes, links, procedures and the [`Schema`] root
//! - [`fixup`]: post-population name deduplication and link reconciliation
//! - [`document`]: the persisted schema document used for merge and round-trips

pub mod document;
pub mod fixup;
pub mod schema;
pub mod types;

pub use document::SchemaDocument;
pub use schema::{AssociatedLink, Column, ForeignKeyLink, Index, Procedure, Schema, Table};
pub use types::{ColumnFlags, DbType, DefaultKind, DefaultValue, Visibility, UNBOUNDED};

//! Work units: atomic structural change instructions handed to a DDL executor.

use serde::Serialize;
use std::fmt;

use crate::core::{Column, DefaultValue, ForeignKeyLink, Index, Table, UNBOUNDED};

/// Kind of a work unit.
///
/// The declaration order is the execution order: every drop precedes every
/// create, tables exist before columns are added to them, columns are
/// altered before indexes and constraints are recreated on them, and foreign
/// keys come last so every parent table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitKind {
    DropIndex,
    DropForeignKey,
    DropDefaultConstraint,
    CreateTable,
    AddColumn,
    AlterColumn,
    AddDefaultConstraint,
    CreateIndex,
    CreateForeignKey,
}

/// A single structural change against one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkUnit {
    /// Create a table with all its columns, indexes and defaults.
    /// Its foreign keys are emitted as separate units.
    CreateTable { table: Table },

    AddColumn { table: String, column: Column },

    /// Alter a column to the desired definition.
    AlterColumn {
        table: String,
        column: Column,
        previous: Column,
        /// Human-readable summary of every changed facet.
        reason: String,
    },

    DropIndex { table: String, index: Index },

    CreateIndex { table: String, index: Index },

    DropForeignKey { table: String, link: ForeignKeyLink },

    CreateForeignKey { table: String, link: ForeignKeyLink },

    DropDefaultConstraint {
        table: String,
        column: String,
        default: DefaultValue,
    },

    AddDefaultConstraint {
        table: String,
        column: String,
        default: DefaultValue,
    },
}

impl WorkUnit {
    pub fn kind(&self) -> WorkUnitKind {
        match self {
            WorkUnit::CreateTable { .. } => WorkUnitKind::CreateTable,
            WorkUnit::AddColumn { .. } => WorkUnitKind::AddColumn,
            WorkUnit::AlterColumn { .. } => WorkUnitKind::AlterColumn,
            WorkUnit::DropIndex { .. } => WorkUnitKind::DropIndex,
            WorkUnit::CreateIndex { .. } => WorkUnitKind::CreateIndex,
            WorkUnit::DropForeignKey { .. } => WorkUnitKind::DropForeignKey,
            WorkUnit::CreateForeignKey { .. } => WorkUnitKind::CreateForeignKey,
            WorkUnit::DropDefaultConstraint { .. } => WorkUnitKind::DropDefaultConstraint,
            WorkUnit::AddDefaultConstraint { .. } => WorkUnitKind::AddDefaultConstraint,
        }
    }

    /// Native name of the table the unit applies to.
    pub fn table(&self) -> &str {
        match self {
            WorkUnit::CreateTable { table } => &table.native_name,
            WorkUnit::AddColumn { table, .. }
            | WorkUnit::AlterColumn { table, .. }
            | WorkUnit::DropIndex { table, .. }
            | WorkUnit::CreateIndex { table, .. }
            | WorkUnit::DropForeignKey { table, .. }
            | WorkUnit::CreateForeignKey { table, .. }
            | WorkUnit::DropDefaultConstraint { table, .. }
            | WorkUnit::AddDefaultConstraint { table, .. } => table,
        }
    }
}

fn describe_length(length: i32) -> String {
    if length == UNBOUNDED {
        "max".to_string()
    } else {
        length.to_string()
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::CreateTable { table } => write!(
                f,
                "Create table {} ({} columns)",
                table.native_name,
                table.columns().len()
            ),
            WorkUnit::AddColumn { table, column } => {
                write!(f, "Add column {}.{} {}", table, column.native_name, column.db_type)?;
                if column.db_type.is_sized() {
                    write!(f, "({})", describe_length(column.length))?;
                }
                Ok(())
            }
            WorkUnit::AlterColumn {
                table,
                column,
                reason,
                ..
            } => write!(f, "Alter column {}.{}: {}", table, column.native_name, reason),
            WorkUnit::DropIndex { table, index } => {
                write!(f, "Drop index {} on {}", index.native_name, table)
            }
            WorkUnit::CreateIndex { table, index } => write!(
                f,
                "Create {}index {} on {} ({})",
                if index.unique { "unique " } else { "" },
                index.native_name,
                table,
                index.columns.join(", ")
            ),
            WorkUnit::DropForeignKey { table, link } => {
                write!(f, "Drop foreign key {} on {}", link.native_name, table)
            }
            WorkUnit::CreateForeignKey { table, link } => write!(
                f,
                "Create foreign key {} on {} ({}) referencing {}",
                link.native_name,
                table,
                link.columns.join(", "),
                link.parent_table
            ),
            WorkUnit::DropDefaultConstraint {
                table,
                column,
                default,
            } => write!(f, "Drop default {} from {}.{}", default, table, column),
            WorkUnit::AddDefaultConstraint {
                table,
                column,
                default,
            } => write!(f, "Add default {} to {}.{}", default, table, column),
        }
    }
}

/// Reason text for a length change.
pub(crate) fn length_reason(from: i32, to: i32) -> String {
    format!(
        "length changed from {} to {}",
        describe_length(from),
        describe_length(to)
    )
}

/// Sort units into execution order. The sort is stable, so units of the same
/// kind keep their table-declaration order.
pub fn sort_work_units(units: &mut [WorkUnit]) {
    units.sort_by_key(|unit| unit.kind());
}

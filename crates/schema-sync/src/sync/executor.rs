//! Work-unit execution boundary.
//!
//! Rendering a [`WorkUnit`] into dialect-specific DDL and running it belongs
//! to the executor implementation. The engine only observes success or an
//! error, which aborts the run.

use tracing::debug;

use super::work_unit::WorkUnit;
use crate::core::Schema;
use crate::error::{Result, SyncError};

/// Executes work units against a target database.
pub trait WorkUnitExecutor {
    /// Best-effort setup before any unit runs (e.g. provisioning helper
    /// types). Failures are logged and ignored by the orchestrator.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Execute one unit. Any error is fatal to the run.
    fn execute(&mut self, unit: &WorkUnit) -> Result<()>;

    /// Executor name for logging.
    fn name(&self) -> &str;
}

/// Executor that applies work units to an in-memory [`Schema`].
///
/// Used to preview the schema a plan produces and to persist it back to a
/// schema document.
#[derive(Debug, Clone, Default)]
pub struct SchemaApplier {
    schema: Schema,
    applied: usize,
}

impl SchemaApplier {
    pub fn new(schema: Schema) -> Self {
        Self { schema, applied: 0 }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of units applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Finish applying and return the fixed-up schema.
    pub fn into_schema(mut self) -> Schema {
        self.schema.fixup();
        self.schema
    }

    /// Apply a single unit.
    pub fn apply(&mut self, unit: &WorkUnit) -> Result<()> {
        match unit {
            WorkUnit::CreateTable { table } => {
                // Links arrive as separate CreateForeignKey units.
                let mut table = table.clone();
                let links: Vec<String> = table
                    .links_to_parents()
                    .iter()
                    .map(|l| l.native_name.clone())
                    .collect();
                for link in links {
                    table.remove_link(&link);
                }
                self.schema.add_table(table)?;
            }
            WorkUnit::AddColumn { table, column } => {
                self.schema.require_table_mut(table)?.add_column(column.clone())?;
            }
            WorkUnit::AlterColumn { table, column, .. } => {
                let target = self.schema.require_table_mut(table)?;
                let existing = target
                    .column_mut(&column.native_name)
                    .ok_or_else(|| SyncError::unknown_column(table, &column.native_name))?;
                existing.db_type = column.db_type;
                existing.length = column.length;
                existing.flags = column.flags;
            }
            WorkUnit::DropIndex { table, index } => {
                self.schema
                    .require_table_mut(table)?
                    .remove_index(&index.native_name)
                    .ok_or_else(|| {
                        SyncError::Executor(format!(
                            "Index {} does not exist on {}",
                            index.native_name, table
                        ))
                    })?;
            }
            WorkUnit::CreateIndex { table, index } => {
                self.schema.require_table_mut(table)?.add_index(index.clone())?;
            }
            WorkUnit::DropForeignKey { table, link } => {
                self.schema
                    .require_table_mut(table)?
                    .remove_link(&link.native_name)
                    .ok_or_else(|| {
                        SyncError::Executor(format!(
                            "Foreign key {} does not exist on {}",
                            link.native_name, table
                        ))
                    })?;
            }
            WorkUnit::CreateForeignKey { table, link } => {
                self.schema.require_table_mut(table)?.add_link(link.clone())?;
            }
            WorkUnit::DropDefaultConstraint { table, column, .. } => {
                let target = self.schema.require_table_mut(table)?;
                let existing = target
                    .column_mut(column)
                    .ok_or_else(|| SyncError::unknown_column(table, column))?;
                existing.default = None;
            }
            WorkUnit::AddDefaultConstraint {
                table,
                column,
                default,
            } => {
                let target = self.schema.require_table_mut(table)?;
                let existing = target
                    .column_mut(column)
                    .ok_or_else(|| SyncError::unknown_column(table, column))?;
                existing.default = Some(default.clone());
            }
        }
        self.applied += 1;
        debug!("Applied: {}", unit);
        Ok(())
    }
}

impl WorkUnitExecutor for SchemaApplier {
    fn execute(&mut self, unit: &WorkUnit) -> Result<()> {
        self.apply(unit)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

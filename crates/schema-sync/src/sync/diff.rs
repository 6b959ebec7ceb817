//! Schema diff engine.
//!
//! Compares a desired schema against an actual one and emits the work units
//! that bring the actual schema into conformance. Tables and columns are
//! never dropped; lengths are only ever widened.
//!
//! Both schemas must have been fixed up (see [`Schema::fixup`]): the cascade
//! for altered key columns walks the actual tables' associated links.

use std::collections::HashSet;

use tracing::debug;

use super::work_unit::{length_reason, sort_work_units, WorkUnit};
use crate::core::{Column, ForeignKeyLink, Index, Schema, Table, UNBOUNDED};

/// Diff policy knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Drop indexes and foreign keys that exist on a surviving actual table
    /// but have no desired counterpart. Off by default: orphans are left alone.
    pub drop_orphans: bool,
}

/// Identity of a dropped member: (lower-cased table, lower-cased member).
type MemberKey = (String, String);

fn member_key(table: &str, member: &str) -> MemberKey {
    (table.to_lowercase(), member.to_lowercase())
}

/// Diff state for one desired/actual pair.
struct SchemaDiff<'a> {
    desired: &'a Schema,
    actual: &'a Schema,
    options: DiffOptions,
    dropped_indexes: HashSet<MemberKey>,
    dropped_links: HashSet<MemberKey>,
    /// Cascade-dropped members the desired schema will not recreate.
    restored_indexes: Vec<(String, Index)>,
    restored_links: Vec<(String, ForeignKeyLink)>,
    units: Vec<WorkUnit>,
}

impl<'a> SchemaDiff<'a> {
    fn new(desired: &'a Schema, actual: &'a Schema, options: DiffOptions) -> Self {
        Self {
            desired,
            actual,
            options,
            dropped_indexes: HashSet::new(),
            dropped_links: HashSet::new(),
            restored_indexes: Vec::new(),
            restored_links: Vec::new(),
            units: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<WorkUnit> {
        // Column changes first: their cascades decide which indexes and links
        // on any table must be recreated.
        for desired in self.desired.tables() {
            match self.actual.table(&desired.native_name) {
                None => self.create_table(desired),
                Some(actual) => self.diff_columns(desired, actual),
            }
        }

        for desired in self.desired.tables() {
            if let Some(actual) = self.actual.table(&desired.native_name) {
                self.diff_indexes(desired, actual);
                self.diff_links(desired, actual);
                if self.options.drop_orphans {
                    self.drop_orphans(desired, actual);
                }
            }
        }

        // Dependents outside the desired schema come back as they were.
        for (table, index) in std::mem::take(&mut self.restored_indexes) {
            self.units.push(WorkUnit::CreateIndex { table, index });
        }
        for (table, link) in std::mem::take(&mut self.restored_links) {
            self.units.push(WorkUnit::CreateForeignKey { table, link });
        }

        self.units
    }

    fn create_table(&mut self, desired: &Table) {
        debug!("Table {} missing, scheduling creation", desired.native_name);
        self.units.push(WorkUnit::CreateTable {
            table: desired.clone(),
        });
        for link in desired.links_to_parents() {
            self.create_link(desired, link);
        }
    }

    fn diff_columns(&mut self, desired_table: &Table, actual_table: &Table) {
        for desired in desired_table.columns() {
            let Some(actual) = actual_table.column(&desired.native_name) else {
                self.units.push(WorkUnit::AddColumn {
                    table: desired_table.native_name.clone(),
                    column: desired.clone(),
                });
                continue;
            };

            let target = alter_target(desired, actual);
            let reasons = column_changes(&target, actual);
            if !reasons.is_empty() && !desired.is_large() {
                self.cascade_column(actual_table, &actual.native_name, actual.is_key());
                self.units.push(WorkUnit::AlterColumn {
                    table: desired_table.native_name.clone(),
                    column: target,
                    previous: actual.clone(),
                    reason: reasons.join("; "),
                });
            }

            if desired.default != actual.default {
                if let Some(default) = &actual.default {
                    self.units.push(WorkUnit::DropDefaultConstraint {
                        table: desired_table.native_name.clone(),
                        column: desired.native_name.clone(),
                        default: default.clone(),
                    });
                }
                if let Some(default) = &desired.default {
                    self.units.push(WorkUnit::AddDefaultConstraint {
                        table: desired_table.native_name.clone(),
                        column: desired.native_name.clone(),
                        default: default.clone(),
                    });
                }
            }
        }
    }

    /// Drop every actual index and link that depends on an altered column.
    fn cascade_column(&mut self, actual_table: &Table, column: &str, is_key: bool) {
        for index in actual_table.indexes() {
            if !index.references(column) || !self.drop_index(actual_table, index) {
                continue;
            }
            if !self.handles_index(&actual_table.native_name, &index.native_name) {
                self.restored_indexes
                    .push((actual_table.native_name.clone(), index.clone()));
            }
        }
        for link in actual_table.links_to_parents() {
            if link.references(column) {
                self.cascade_link(&actual_table.native_name, link);
            }
        }
        // Links on other tables point at this table's key.
        if is_key {
            for associated in actual_table.associated_links() {
                let child_link = self
                    .actual
                    .table(&associated.child_table)
                    .and_then(|child| child.link(&associated.link));
                if let Some(link) = child_link {
                    self.cascade_link(&associated.child_table, link);
                }
            }
        }
    }

    fn cascade_link(&mut self, table: &str, link: &ForeignKeyLink) {
        if self.drop_link(table, link) && !self.handles_link(table, &link.native_name) {
            debug!(
                "Foreign key {} on {} is outside the desired schema, restoring after alter",
                link.native_name, table
            );
            self.restored_links.push((table.to_string(), link.clone()));
        }
    }

    /// Whether a later pass recreates (or, with `drop_orphans`, drops) a
    /// cascade-dropped index. Tables outside the run are never revisited.
    fn handles_index(&self, table: &str, index: &str) -> bool {
        match self.desired.table(table) {
            None => false,
            Some(desired) => desired.index(index).is_some() || self.options.drop_orphans,
        }
    }

    /// Link counterpart of [`handles_index`](Self::handles_index). Unsupported
    /// desired links are never created, so those are restored too.
    fn handles_link(&self, table: &str, link: &str) -> bool {
        match self.desired.table(table) {
            None => false,
            Some(desired) => match desired.link(link) {
                Some(desired_link) => desired_link.is_supported(self.desired),
                None => self.options.drop_orphans,
            },
        }
    }

    /// Schedule an index drop. Returns false if it was already scheduled.
    fn drop_index(&mut self, actual_table: &Table, index: &Index) -> bool {
        if !self
            .dropped_indexes
            .insert(member_key(&actual_table.native_name, &index.native_name))
        {
            return false;
        }
        self.units.push(WorkUnit::DropIndex {
            table: actual_table.native_name.clone(),
            index: index.clone(),
        });
        true
    }

    /// Schedule a foreign key drop. Returns false if it was already scheduled.
    fn drop_link(&mut self, table: &str, link: &ForeignKeyLink) -> bool {
        if !self.dropped_links.insert(member_key(table, &link.native_name)) {
            return false;
        }
        self.units.push(WorkUnit::DropForeignKey {
            table: table.to_string(),
            link: link.clone(),
        });
        true
    }

    fn create_link(&mut self, desired_table: &Table, link: &ForeignKeyLink) {
        if link.is_supported(self.desired) {
            self.units.push(WorkUnit::CreateForeignKey {
                table: desired_table.native_name.clone(),
                link: link.clone(),
            });
        } else {
            debug!(
                "Skipping foreign key {}: parent table {} is not part of the schema",
                link.native_name, link.parent_table
            );
        }
    }

    fn diff_indexes(&mut self, desired_table: &Table, actual_table: &Table) {
        for desired in desired_table.indexes() {
            let key = member_key(&actual_table.native_name, &desired.native_name);
            if let Some(actual) = actual_table.index(&desired.native_name) {
                if !self.dropped_indexes.contains(&key) {
                    if actual.matches(desired) {
                        continue;
                    }
                    self.drop_index(actual_table, actual);
                }
            }
            self.units.push(WorkUnit::CreateIndex {
                table: desired_table.native_name.clone(),
                index: desired.clone(),
            });
        }
    }

    fn diff_links(&mut self, desired_table: &Table, actual_table: &Table) {
        for desired in desired_table.links_to_parents() {
            if !desired.is_supported(self.desired) {
                continue;
            }
            let key = member_key(&actual_table.native_name, &desired.native_name);
            if let Some(actual) = actual_table.link(&desired.native_name) {
                if !self.dropped_links.contains(&key) {
                    if actual.matches(desired) {
                        continue;
                    }
                    self.drop_link(&actual_table.native_name, actual);
                }
            }
            self.create_link(desired_table, desired);
        }
    }

    fn drop_orphans(&mut self, desired_table: &Table, actual_table: &Table) {
        for index in actual_table.indexes() {
            if desired_table.index(&index.native_name).is_none() {
                self.drop_index(actual_table, index);
            }
        }
        for link in actual_table.links_to_parents() {
            if desired_table.link(&link.native_name).is_none() {
                self.drop_link(&actual_table.native_name, link);
            }
        }
    }
}

fn widens_length(desired: &Column, actual: &Column) -> bool {
    desired.db_type.is_sized()
        && actual.length != UNBOUNDED
        && (desired.length == UNBOUNDED || desired.length > actual.length)
}

/// The column an alteration should produce: the desired column, keeping the
/// actual length unless the desired one widens it. An unbounded actual column
/// stays unbounded.
fn alter_target(desired: &Column, actual: &Column) -> Column {
    let mut target = desired.clone();
    if desired.db_type.is_sized()
        && actual.db_type.is_sized()
        && !widens_length(desired, actual)
    {
        target.length = actual.length;
    }
    target
}

/// Describe every structural facet in which `target` differs from `actual`.
///
/// `target` comes from [`alter_target`], so a length difference is always a
/// widening. Nullability is never reported for key columns.
fn column_changes(target: &Column, actual: &Column) -> Vec<String> {
    let mut reasons = Vec::new();

    if target.db_type.is_sized()
        && actual.db_type.is_sized()
        && target.length != actual.length
    {
        reasons.push(length_reason(actual.length, target.length));
    }

    if !target.is_key() && !actual.is_key() && target.is_nullable() != actual.is_nullable() {
        reasons.push(format!(
            "nullable changed from {} to {}",
            actual.is_nullable(),
            target.is_nullable()
        ));
    }

    if target.db_type != actual.db_type {
        reasons.push(format!(
            "type changed from {} to {}",
            actual.db_type, target.db_type
        ));
    }

    if target.is_large() != actual.is_large() {
        reasons.push(format!(
            "large changed from {} to {}",
            actual.is_large(),
            target.is_large()
        ));
    }

    reasons
}

/// Compute the work units turning `actual` into `desired`.
///
/// Units are returned in per-table declaration order; use
/// [`sort_work_units`] (or [`plan_sync`]) before executing them.
pub fn diff_schemas(desired: &Schema, actual: &Schema, options: DiffOptions) -> Vec<WorkUnit> {
    SchemaDiff::new(desired, actual, options).run()
}

/// Compute the work units and sort them into execution order.
pub fn plan_sync(desired: &Schema, actual: &Schema, options: DiffOptions) -> Vec<WorkUnit> {
    let mut units = diff_schemas(desired, actual, options);
    sort_work_units(&mut units);
    units
}

//! Desired-schema construction from entity descriptors.
//!
//! Tables are built in two phases. Every selected entity first becomes a
//! table shell (columns and indexes). Links are resolved afterwards, once
//! every parent table that is part of the run is known. A link whose target
//! is registered but not selected stays on the table; it is unsupported and
//! the diff never creates it.

use tracing::{debug, info};

use super::{EntityDescriptor, EntityRegistry, FieldDescriptor};
use crate::core::{Column, ForeignKeyLink, Index, Schema, Table};
use crate::error::{Result, SyncError};

fn build_column(field: &FieldDescriptor) -> Column {
    let mut column = Column::new(&field.native_name, field.db_type).length(field.size);
    if let Some(name) = &field.name {
        column = column.named(name);
    }
    column.flags.nullable = field.nullable;
    column.flags.large = field.large;
    column.flags.auto_increment = field.auto_increment;
    if field.key {
        column = column.key();
    }
    column.default = field.default.clone();
    column.enumeration_type_name = field.enumeration_type_name.clone();
    column
}

fn build_table_shell(entity: &EntityDescriptor) -> Result<Table> {
    let mut table = Table::new(&entity.native_table_name)
        .named(entity.display_name.as_deref().unwrap_or(&entity.name));
    table.generate = entity.generate;

    // Extension fields live outside the entity's own table.
    for field in entity.fields.iter().filter(|f| !f.extended) {
        table.add_column(build_column(field))?;
    }

    for descriptor in &entity.indexes {
        let mut index = Index::new(&descriptor.native_name, descriptor.fields.iter().cloned())
            .include(descriptor.included_fields.iter().cloned())
            .computed(descriptor.computed_fields.iter().cloned());
        if descriptor.unique {
            index = index.unique();
        }
        table.add_index(index)?;
    }

    Ok(table)
}

/// Build the desired schema for `selected` entities.
///
/// `registry` resolves link targets: a target absent from the registry is a
/// structural error, a target present but not selected yields an unsupported
/// link. The returned schema is fixed up.
pub fn build_desired_schema(registry: &EntityRegistry, selected: &[&EntityDescriptor]) -> Result<Schema> {
    let mut schema = Schema::new();

    // Phase 1: table shells
    for entity in selected {
        schema.add_table(build_table_shell(entity)?)?;
    }

    // Phase 2: links
    for entity in selected {
        for descriptor in &entity.links {
            let target = registry.get(&descriptor.target).ok_or_else(|| {
                SyncError::Structural(format!(
                    "Link {} on entity {} targets unknown entity {}",
                    descriptor.native_name, entity.name, descriptor.target
                ))
            })?;

            let link = ForeignKeyLink::new(
                &descriptor.native_name,
                &target.native_table_name,
                descriptor.fields.iter().cloned(),
            );
            if schema.table(&target.native_table_name).is_none() {
                debug!(
                    "Link {} on {} targets {} outside this run",
                    descriptor.native_name, entity.native_table_name, target.native_table_name
                );
            }
            schema
                .require_table_mut(&entity.native_table_name)?
                .add_link(link)?;
        }
    }

    schema.fixup();
    info!("Built desired schema: {} tables", schema.tables().len());
    Ok(schema)
}

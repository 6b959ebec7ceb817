//! Post-population normalization of a [`Schema`].
//!
//! Fixup must run after a schema is populated (from entities, from the
//! catalog, or from a persisted document) and after any programmatic
//! mutation, before the schema is diffed or handed to code generation.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::schema::{AssociatedLink, Schema};

/// Suffix appended to a column whose display name equals its table's.
const OWNER_COLLISION_SUFFIX: &str = "Value";

/// Make display names unique, case-insensitively, in iteration order.
///
/// The first occurrence of a name keeps it. Later collisions get the first
/// occurrence's spelling followed by `2`, `3`, ... skipping candidates that
/// are already taken. Returns the number of names changed.
fn mangle_names<'a>(names: impl IntoIterator<Item = &'a mut String>) -> usize {
    let mut taken: HashSet<String> = HashSet::new();
    // lower-cased name -> (first spelling, next counter)
    let mut bases: HashMap<String, (String, u32)> = HashMap::new();
    let mut renamed = 0;

    for name in names {
        let key = name.to_lowercase();
        if taken.insert(key.clone()) {
            bases.entry(key).or_insert_with(|| (name.clone(), 2));
            continue;
        }

        let candidate = {
            let (base, next) = bases
                .entry(key)
                .or_insert_with(|| (name.clone(), 2));
            loop {
                let candidate = format!("{}{}", base, next);
                *next += 1;
                if taken.insert(candidate.to_lowercase()) {
                    break candidate;
                }
            }
        };
        bases
            .entry(candidate.to_lowercase())
            .or_insert_with(|| (candidate.clone(), 2));
        *name = candidate;
        renamed += 1;
    }

    renamed
}

impl Schema {
    /// Deduplicate display names, assign ordinals, default link names and
    /// rebuild associated links.
    ///
    /// Deterministic for a given member order and idempotent: a second run
    /// changes nothing.
    pub fn fixup(&mut self) {
        let mut renamed = mangle_names(self.tables_mut().iter_mut().map(|t| &mut t.name));
        renamed += mangle_names(self.procedures_mut().iter_mut().map(|p| &mut p.name));

        let display_names: HashMap<String, String> = self
            .tables()
            .iter()
            .map(|t| (t.native_name.to_lowercase(), t.name.clone()))
            .collect();

        for table in self.tables_mut() {
            for link in table.links_to_parents_mut() {
                if link.name.trim().is_empty() {
                    link.name = display_names
                        .get(&link.parent_table.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| link.parent_table.clone());
                }
            }

            let owner = table.name.clone();
            for column in table.columns_mut() {
                if column.name.eq_ignore_ascii_case(&owner) {
                    column.name.push_str(OWNER_COLLISION_SUFFIX);
                    renamed += 1;
                }
            }

            // Columns, links and indexes share one member namespace.
            let mut names: Vec<String> = table
                .columns()
                .iter()
                .map(|c| c.name.clone())
                .chain(table.links_to_parents().iter().map(|l| l.name.clone()))
                .chain(table.indexes().iter().map(|i| i.name.clone()))
                .collect();
            renamed += mangle_names(names.iter_mut());

            let mut names = names.into_iter();
            for (ordinal, column) in table.columns_mut().iter_mut().enumerate() {
                column.ordinal = ordinal;
                if column.flags.key {
                    column.flags.nullable = false;
                }
                if let Some(name) = names.next() {
                    column.name = name;
                }
            }
            for link in table.links_to_parents_mut() {
                if let Some(name) = names.next() {
                    link.name = name;
                }
            }
            for (ordinal, index) in table.indexes_mut().iter_mut().enumerate() {
                index.ordinal = ordinal;
                if let Some(name) = names.next() {
                    index.name = name;
                }
            }
        }

        self.rebuild_associated_links();

        debug!(
            "Fixup complete: {} tables, {} names changed",
            self.tables().len(),
            renamed
        );
    }

    /// Recompute every table's incoming links from all outgoing links.
    fn rebuild_associated_links(&mut self) {
        let mut incoming: HashMap<String, Vec<AssociatedLink>> = HashMap::new();
        for table in self.tables() {
            for link in table.links_to_parents() {
                incoming
                    .entry(link.parent_table.to_lowercase())
                    .or_default()
                    .push(AssociatedLink {
                        child_table: table.native_name.clone(),
                        link: link.native_name.clone(),
                    });
            }
        }
        for table in self.tables_mut() {
            let links = incoming
                .remove(&table.native_name.to_lowercase())
                .unwrap_or_default();
            table.set_associated_links(links);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, ForeignKeyLink, Index, Table};
    use crate::core::types::DbType;

    fn names(schema: &Schema) -> Vec<String> {
        schema.tables().iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_mangle_names_sequential() {
        let mut names = vec![
            "Order".to_string(),
            "order".to_string(),
            "ORDER".to_string(),
            "Item".to_string(),
        ];
        assert_eq!(mangle_names(names.iter_mut()), 2);
        assert_eq!(names, vec!["Order", "Order2", "Order3", "Item"]);
    }

    #[test]
    fn test_mangle_skips_taken_candidates() {
        let mut names = vec![
            "Order".to_string(),
            "Order2".to_string(),
            "order".to_string(),
        ];
        mangle_names(names.iter_mut());
        assert_eq!(names, vec!["Order", "Order2", "Order3"]);
    }

    #[test]
    fn test_table_name_collision() {
        let mut schema = Schema::new();
        schema.add_table(Table::new("dbo.Order").named("Order")).unwrap();
        schema.add_table(Table::new("sales.order").named("order")).unwrap();
        schema.fixup();
        assert_eq!(names(&schema), vec!["Order", "Order2"]);

        schema.add_table(Table::new("archive.ORDER").named("ORDER")).unwrap();
        schema.fixup();
        assert_eq!(names(&schema), vec!["Order", "Order2", "Order3"]);
        assert_eq!(schema.tables()[2].native_name, "archive.ORDER");
    }

    #[test]
    fn test_column_named_like_table_gets_value_suffix() {
        let mut table = Table::new("Status");
        table.add_column(Column::new("Id", DbType::Int32).key()).unwrap();
        table.add_column(Column::new("status", DbType::String).length(10)).unwrap();
        let mut schema = Schema::new();
        schema.add_table(table).unwrap();
        schema.fixup();

        let table = schema.table("Status").unwrap();
        assert_eq!(table.columns()[1].name, "statusValue");
        assert_eq!(table.columns()[1].native_name, "status");
    }

    #[test]
    fn test_fixup_is_stable() {
        let mut orders = Table::new("Orders").named("Order");
        orders.add_column(Column::new("Id", DbType::Int32).key()).unwrap();
        orders.add_column(Column::new("Order", DbType::Int32)).unwrap();
        orders.add_column(Column::new("CustomerId", DbType::Int32)).unwrap();
        orders.add_column(Column::new("Customer", DbType::String).length(50)).unwrap();
        orders
            .add_link(ForeignKeyLink::new("FK_Orders_Customers", "Customers", ["CustomerId"]))
            .unwrap();
        orders.add_index(Index::new("IX_Customer", ["CustomerId"])).unwrap();

        let mut schema = Schema::new();
        schema.add_table(orders).unwrap();
        schema.add_table(Table::new("Customers").named("Customer")).unwrap();
        schema.add_table(Table::new("customers_old").named("customer")).unwrap();

        schema.fixup();
        let first = schema.clone();
        schema.fixup();
        assert_eq!(schema, first);

        let orders = schema.table("Orders").unwrap();
        assert_eq!(orders.columns()[1].name, "OrderValue");
        // Link defaulted to the parent's display name, then collided with the column.
        assert_eq!(orders.links_to_parents()[0].name, "Customer2");
        let ordinals: Vec<usize> = orders.columns().iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_associated_links_rebuilt() {
        let mut orders = Table::new("Orders");
        orders.add_column(Column::new("CustomerId", DbType::Int32)).unwrap();
        orders
            .add_link(ForeignKeyLink::new("FK_Orders_Customers", "Customers", ["CustomerId"]))
            .unwrap();

        let mut schema = Schema::new();
        schema.add_table(Table::new("Customers")).unwrap();
        schema.add_table(orders).unwrap();
        schema.fixup();

        let customers = schema.table("customers").unwrap();
        assert_eq!(customers.associated_links().len(), 1);
        assert_eq!(customers.associated_links()[0].child_table, "Orders");

        schema
            .table_mut("Orders")
            .unwrap()
            .remove_link("FK_Orders_Customers");
        schema.fixup();
        assert!(schema.table("Customers").unwrap().associated_links().is_empty());
    }

    #[test]
    fn test_fixup_clears_nullable_on_keys() {
        let mut table = Table::new("T");
        table.add_column(Column::new("Id", DbType::Int32).key()).unwrap();
        table.columns_mut()[0].flags.nullable = true;
        let mut schema = Schema::new();
        schema.add_table(table).unwrap();
        schema.fixup();
        assert!(!schema.tables()[0].columns()[0].flags.nullable);
    }
}

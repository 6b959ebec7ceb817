//! Migration steps and the explicit step registry.

use tracing::{debug, info};

use crate::core::Schema;
use crate::entity::EntityDescriptor;
use crate::error::Result;
use crate::sync::{WorkUnit, WorkUnitExecutor};

/// What a step can reach while it executes.
pub struct StepContext<'a> {
    pub executor: &'a mut dyn WorkUnitExecutor,
    pub desired: &'a Schema,
    pub actual: &'a Schema,
    /// Log every unit at info level.
    pub trace: bool,
}

/// One unit of a synchronization run.
///
/// Steps report their pending work before anything runs; `execute` is only
/// called in modes that apply changes.
pub trait MigrationStep {
    fn name(&self) -> &str;

    /// Whether the step has nothing to do.
    fn is_up_to_date(&self) -> bool;

    /// Friendly descriptions of the pending work.
    fn messages(&self) -> Vec<String>;

    fn execute(&mut self, ctx: &mut StepContext<'_>) -> Result<()>;
}

/// Name of the built-in schema synchronization step.
pub const SCHEMA_SYNC_STEP: &str = "Schema synchronization";

/// Built-in step carrying the sorted work units of the diff.
#[derive(Debug, Clone, Default)]
pub struct SchemaSyncStep {
    units: Vec<WorkUnit>,
}

impl SchemaSyncStep {
    pub fn new(units: Vec<WorkUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }
}

impl MigrationStep for SchemaSyncStep {
    fn name(&self) -> &str {
        SCHEMA_SYNC_STEP
    }

    fn is_up_to_date(&self) -> bool {
        self.units.is_empty()
    }

    fn messages(&self) -> Vec<String> {
        self.units.iter().map(ToString::to_string).collect()
    }

    fn execute(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        for (i, unit) in self.units.iter().enumerate() {
            if ctx.trace {
                info!("[{}/{}] {}", i + 1, self.units.len(), unit);
            } else {
                debug!("[{}/{}] {}", i + 1, self.units.len(), unit);
            }
            ctx.executor.execute(unit)?;
        }
        Ok(())
    }
}

/// Creates a fresh step instance for a run.
pub type StepFactory = Box<dyn Fn() -> Box<dyn MigrationStep>>;

struct Registration {
    /// Entity the step belongs to; `None` for global steps.
    entity: Option<String>,
    factory: StepFactory,
}

/// Explicit registry of custom steps keyed by optional entity name.
///
/// Entity-scoped steps are instantiated only when their entity takes part in
/// the run. Global steps are instantiated only on full (unscoped) runs.
/// Instances come out in registration order.
#[derive(Default)]
pub struct StepRegistry {
    registrations: Vec<Registration>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step that runs on every full run.
    pub fn register_global<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn MigrationStep> + 'static,
    {
        self.registrations.push(Registration {
            entity: None,
            factory: Box::new(factory),
        });
    }

    /// Register a step that runs whenever `entity` is in scope.
    pub fn register_for<F>(&mut self, entity: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn MigrationStep> + 'static,
    {
        self.registrations.push(Registration {
            entity: Some(entity.into()),
            factory: Box::new(factory),
        });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Instantiate the steps for a run over `in_scope` entities.
    pub fn instantiate(&self, in_scope: &[&EntityDescriptor], scoped: bool) -> Vec<Box<dyn MigrationStep>> {
        self.registrations
            .iter()
            .filter(|r| match &r.entity {
                Some(entity) => in_scope.iter().any(|e| e.name.eq_ignore_ascii_case(entity)),
                None => !scoped,
            })
            .map(|r| (r.factory)())
            .collect()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self
            .registrations
            .iter()
            .map(|r| r.entity.as_deref().unwrap_or("<global>"))
            .collect();
        f.debug_struct("StepRegistry").field("steps", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DbType};
    use crate::sync::SchemaApplier;

    struct Named(&'static str);

    impl MigrationStep for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn is_up_to_date(&self) -> bool {
            true
        }
        fn messages(&self) -> Vec<String> {
            Vec::new()
        }
        fn execute(&mut self, _ctx: &mut StepContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> StepRegistry {
        let mut steps = StepRegistry::new();
        steps.register_global(|| Box::new(Named("reindex")));
        steps.register_for("Customer", || Box::new(Named("seed customers")));
        steps.register_for("Order", || Box::new(Named("backfill orders")));
        steps
    }

    fn names(steps: &[Box<dyn MigrationStep>]) -> Vec<&str> {
        steps.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_full_run_instantiates_global_and_entity_steps() {
        let customer = EntityDescriptor::new("Customer", "Customers");
        let order = EntityDescriptor::new("Order", "Orders");
        let steps = registry().instantiate(&[&customer, &order], false);
        assert_eq!(names(&steps), vec!["reindex", "seed customers", "backfill orders"]);
    }

    #[test]
    fn test_scoped_run_skips_global_steps() {
        let order = EntityDescriptor::new("order", "Orders");
        let steps = registry().instantiate(&[&order], true);
        assert_eq!(names(&steps), vec!["backfill orders"]);
    }

    #[test]
    fn test_schema_sync_step_executes_units() {
        let mut table = crate::core::Table::new("T");
        table.add_column(Column::new("Id", DbType::Int32).key()).unwrap();
        let mut step = SchemaSyncStep::new(vec![WorkUnit::CreateTable { table }]);
        assert!(!step.is_up_to_date());
        assert_eq!(step.messages(), vec!["Create table T (1 columns)".to_string()]);

        let mut applier = SchemaApplier::new(Schema::new());
        let empty = Schema::new();
        let mut ctx = StepContext {
            executor: &mut applier,
            desired: &empty,
            actual: &empty,
            trace: true,
        };
        step.execute(&mut ctx).unwrap();
        assert_eq!(applier.applied(), 1);
    }
}

//! Synchronization orchestrator - main workflow coordinator.

mod steps;

pub use steps::{
    MigrationStep, SchemaSyncStep, StepContext, StepFactory, StepRegistry, SCHEMA_SYNC_STEP,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogReader, EmptyCatalog};
use crate::config::{Config, SyncMode};
use crate::core::Schema;
use crate::entity::{build_desired_schema, EntityRegistry};
use crate::error::{Result, SyncError};
use crate::sync::{plan_sync, WorkUnitExecutor};

/// Where a run currently stands.
///
/// Runs move forward only. A failed or completed orchestrator must be
/// [`reset`](Orchestrator::reset) before it runs again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    SchemaLoaded,
    DiffComputed,
    CheckReported,
    StepsApplied,
    Completed,
    Failed { step: String, cause: String },
}

/// Advisory progress of the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub status: String,
    /// Steps finished so far.
    pub current: usize,
    pub total: usize,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub up_to_date: bool,
    pub messages: Vec<String>,
}

/// Result of a synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Unique run identifier.
    pub run_id: String,

    pub mode: SyncMode,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Tables in the desired schema.
    pub tables_desired: usize,

    /// Work units the diff produced.
    pub units_planned: usize,

    /// Work units handed to the executor.
    pub units_applied: usize,

    /// True when no step had anything to do.
    pub is_up_to_date: bool,

    /// Per-step reports, in execution order.
    pub steps: Vec<StepReport>,
}

impl SyncResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

type UpdatedListener = Box<dyn FnMut(&SyncResult)>;
type ProgressListener = Box<dyn FnMut(&Progress)>;

/// Synchronization orchestrator.
///
/// Owns the per-run context: configuration, entity registry and custom step
/// registry. Database access goes through the catalog reader and executor
/// handed to [`run`](Orchestrator::run).
pub struct Orchestrator {
    config: Config,
    entities: EntityRegistry,
    steps: StepRegistry,
    state: RunState,
    progress: Progress,
    updated_listeners: Vec<UpdatedListener>,
    progress_listeners: Vec<ProgressListener>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: Config, entities: EntityRegistry) -> Self {
        Self {
            config,
            entities,
            steps: StepRegistry::new(),
            state: RunState::NotStarted,
            progress: Progress::default(),
            updated_listeners: Vec::new(),
            progress_listeners: Vec::new(),
        }
    }

    /// Set the custom step registry.
    pub fn with_steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    /// Register a listener fired once after every step has been applied.
    pub fn on_updated<F>(&mut self, listener: F)
    where
        F: FnMut(&SyncResult) + 'static,
    {
        self.updated_listeners.push(Box::new(listener));
    }

    /// Register a listener for advisory progress updates.
    pub fn on_progress<F>(&mut self, listener: F)
    where
        F: FnMut(&Progress) + 'static,
    {
        self.progress_listeners.push(Box::new(listener));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Return to `NotStarted` so the orchestrator can run again.
    pub fn reset(&mut self) {
        self.state = RunState::NotStarted;
        self.progress = Progress::default();
    }

    fn report_progress(&mut self, status: impl Into<String>, current: usize, total: usize) {
        self.progress = Progress {
            status: status.into(),
            current,
            total,
        };
        for listener in &mut self.progress_listeners {
            listener(&self.progress);
        }
    }

    fn load_actual(&self, catalog: &dyn CatalogReader) -> Result<Schema> {
        if self.config.sync.mode == SyncMode::Create {
            debug!("Create mode: starting from an empty schema");
            return EmptyCatalog.load_schema(&self.config.catalog.filter());
        }
        debug!("Loading actual schema via {} catalog", catalog.name());
        catalog.load_schema(&self.config.catalog.filter())
    }

    /// Run a synchronization.
    ///
    /// Input and structural errors surface before anything is executed. Once
    /// steps run, the first failure is wrapped with the step name, logged and
    /// returned; later steps never run and nothing is rolled back.
    pub fn run(
        &mut self,
        catalog: &dyn CatalogReader,
        executor: &mut dyn WorkUnitExecutor,
    ) -> Result<SyncResult> {
        if self.state != RunState::NotStarted {
            return Err(SyncError::InvalidState(format!(
                "run requires NotStarted, found {:?}; call reset() first",
                self.state
            )));
        }

        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mode = self.config.sync.mode;
        let scoped = self.config.sync.is_scoped();

        info!("Starting schema sync run: {} (mode: {})", run_id, mode);

        // Phase 1: Build desired and load actual schemas
        self.report_progress("Loading schemas", 0, 0);
        let (desired, custom_steps) = {
            let selected = self
                .entities
                .select(&self.config.sync.entities, self.config.sync.database.as_deref())?;
            let desired = build_desired_schema(&self.entities, &selected)?;
            (desired, self.steps.instantiate(&selected, scoped))
        };
        let actual = self.load_actual(catalog)?;
        self.state = RunState::SchemaLoaded;
        info!(
            "Desired schema: {} tables, actual schema: {} tables",
            desired.tables().len(),
            actual.tables().len()
        );

        // Phase 2: Diff
        let units = plan_sync(&desired, &actual, self.config.sync.diff_options());
        let units_planned = units.len();
        self.state = RunState::DiffComputed;
        info!("Planned {} work units", units_planned);

        let mut steps: Vec<Box<dyn MigrationStep>> = vec![Box::new(SchemaSyncStep::new(units))];
        steps.extend(custom_steps);

        let reports: Vec<StepReport> = steps
            .iter()
            .map(|step| StepReport {
                name: step.name().to_string(),
                up_to_date: step.is_up_to_date(),
                messages: step.messages(),
            })
            .collect();
        let is_up_to_date = reports.iter().all(|r| r.up_to_date);

        // Phase 3: Apply
        let total = steps.len();
        let mut units_applied = 0;
        if mode.applies_changes() {
            if let Err(e) = executor.prepare() {
                warn!("Executor {} setup failed, continuing: {}", executor.name(), e);
            }

            for (i, step) in steps.iter_mut().enumerate() {
                let name = step.name().to_string();
                self.report_progress(format!("Running {}", name), i, total);
                if step.is_up_to_date() {
                    debug!("{}: up to date", name);
                    continue;
                }

                let mut ctx = StepContext {
                    executor: &mut *executor,
                    desired: &desired,
                    actual: &actual,
                    trace: self.config.sync.trace,
                };
                if let Err(e) = step.execute(&mut ctx) {
                    error!("{}: failed - {}", name, e);
                    self.state = RunState::Failed {
                        step: name.clone(),
                        cause: e.to_string(),
                    };
                    return Err(SyncError::step(name, e));
                }
                if name == SCHEMA_SYNC_STEP {
                    units_applied = units_planned;
                }
                info!("{}: completed", name);
            }
            self.state = RunState::StepsApplied;
        } else {
            for report in &reports {
                for message in &report.messages {
                    info!("{}: {}", report.name, message);
                }
            }
            self.state = RunState::CheckReported;
        }
        self.report_progress("Completed", total, total);

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let result = SyncResult {
            run_id,
            mode,
            status: "completed".to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            tables_desired: desired.tables().len(),
            units_planned,
            units_applied,
            is_up_to_date,
            steps: reports,
        };

        if self.state == RunState::StepsApplied {
            for listener in &mut self.updated_listeners {
                listener(&result);
            }
        }
        self.state = RunState::Completed;

        info!(
            "Schema sync {} in {:.2}s: {} units planned, {} applied, up to date: {}",
            result.status, duration, units_planned, units_applied, is_up_to_date
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentCatalog;
    use crate::core::{DbType, SchemaDocument};
    use crate::entity::{EntityDescriptor, FieldDescriptor, LinkDescriptor};
    use crate::sync::{SchemaApplier, WorkUnit};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn entities() -> EntityRegistry {
        EntityRegistry::from_descriptors([
            EntityDescriptor::new("Customer", "Customers")
                .field(FieldDescriptor::new("Id", DbType::Int32).key())
                .field(FieldDescriptor::new("Name", DbType::String).size(100)),
            EntityDescriptor::new("Order", "Orders")
                .field(FieldDescriptor::new("Id", DbType::Int32).key())
                .field(FieldDescriptor::new("CustomerId", DbType::Int32))
                .link(LinkDescriptor::new("FK_Orders_Customers", "Customer", ["CustomerId"])),
        ])
        .unwrap()
    }

    fn config(mode: SyncMode) -> Config {
        let mut config = Config::default();
        config.sync.mode = mode;
        config
    }

    /// Actual schema holding Customers with a narrower Name column.
    fn actual_catalog() -> DocumentCatalog {
        let yaml = r#"
Tables:
  - NativeName: Customers
    Columns:
      - NativeName: Id
        DbType: Int32
        Flags:
          Key: true
      - NativeName: Name
        DbType: String
        Length: 50
"#;
        DocumentCatalog::new(SchemaDocument::from_yaml(yaml).unwrap())
    }

    #[derive(Default)]
    struct RecordingExecutor {
        units: Vec<WorkUnit>,
        fail_prepare: bool,
    }

    impl WorkUnitExecutor for RecordingExecutor {
        fn prepare(&mut self) -> Result<()> {
            if self.fail_prepare {
                return Err(SyncError::Executor("helper types unavailable".into()));
            }
            Ok(())
        }

        fn execute(&mut self, unit: &WorkUnit) -> Result<()> {
            self.units.push(unit.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct CountingStep {
        name: &'static str,
        runs: Rc<Cell<usize>>,
        fail: bool,
    }

    impl MigrationStep for CountingStep {
        fn name(&self) -> &str {
            self.name
        }
        fn is_up_to_date(&self) -> bool {
            false
        }
        fn messages(&self) -> Vec<String> {
            vec![format!("{} pending", self.name)]
        }
        fn execute(&mut self, _ctx: &mut StepContext<'_>) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.fail {
                return Err(SyncError::Executor("constraint violation".into()));
            }
            Ok(())
        }
    }

    fn counting(name: &'static str, runs: &Rc<Cell<usize>>, fail: bool) -> impl Fn() -> Box<dyn MigrationStep> {
        let runs = Rc::clone(runs);
        move || -> Box<dyn MigrationStep> {
            Box::new(CountingStep {
                name,
                runs: Rc::clone(&runs),
                fail,
            })
        }
    }

    #[test]
    fn test_update_applies_sorted_units() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Update), entities());
        let mut executor = RecordingExecutor::default();
        let result = orchestrator.run(&actual_catalog(), &mut executor).unwrap();

        let kinds: Vec<String> = executor.units.iter().map(|u| format!("{:?}", u.kind())).collect();
        assert_eq!(kinds, vec!["CreateTable", "AlterColumn", "CreateForeignKey"]);
        assert_eq!(result.units_planned, 3);
        assert_eq!(result.units_applied, 3);
        assert!(!result.is_up_to_date);
        assert_eq!(result.steps[0].name, SCHEMA_SYNC_STEP);
        assert_eq!(*orchestrator.state(), RunState::Completed);
    }

    #[test]
    fn test_check_mode_reports_without_applying() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Check), entities());
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        orchestrator.on_updated(move |_| counter.set(counter.get() + 1));

        let mut executor = RecordingExecutor::default();
        let result = orchestrator.run(&actual_catalog(), &mut executor).unwrap();

        assert!(executor.units.is_empty());
        assert_eq!(result.units_applied, 0);
        assert!(!result.is_up_to_date);
        assert!(result.steps[0]
            .messages
            .iter()
            .any(|m| m.contains("length changed from 50 to 100")));
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_create_mode_ignores_catalog() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Create), entities());
        let mut applier = SchemaApplier::new(Schema::new());
        let result = orchestrator.run(&actual_catalog(), &mut applier).unwrap();
        assert_eq!(result.units_planned, 3);

        let schema = applier.into_schema();
        assert_eq!(schema.tables().len(), 2);
        assert_eq!(schema.table("Orders").unwrap().links_to_parents().len(), 1);
    }

    #[test]
    fn test_second_run_after_apply_is_up_to_date() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Create), entities());
        let mut applier = SchemaApplier::new(Schema::new());
        orchestrator.run(&EmptyCatalog, &mut applier).unwrap();
        let document = SchemaDocument::from_schema(&applier.into_schema());

        let mut orchestrator = Orchestrator::new(config(SyncMode::Check), entities());
        let result = orchestrator
            .run(&DocumentCatalog::new(document), &mut RecordingExecutor::default())
            .unwrap();
        assert!(result.is_up_to_date);
        assert_eq!(result.units_planned, 0);
    }

    #[test]
    fn test_failing_step_aborts_run() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let mut steps = StepRegistry::new();
        steps.register_global(counting("seed lookups", &first, true));
        steps.register_global(counting("rebuild totals", &second, false));

        let mut orchestrator = Orchestrator::new(config(SyncMode::Update), entities()).with_steps(steps);
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        orchestrator.on_updated(move |_| counter.set(counter.get() + 1));

        let err = orchestrator
            .run(&actual_catalog(), &mut RecordingExecutor::default())
            .unwrap_err();
        assert_eq!(err.failed_step(), Some("seed lookups"));
        assert!(err.to_string().contains("constraint violation"));
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
        assert_eq!(fired.get(), 0);
        assert!(matches!(
            orchestrator.state(),
            RunState::Failed { step, .. } if step == "seed lookups"
        ));
    }

    #[test]
    fn test_run_requires_reset() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Check), entities());
        let mut executor = RecordingExecutor::default();
        orchestrator.run(&actual_catalog(), &mut executor).unwrap();

        let err = orchestrator.run(&actual_catalog(), &mut executor).unwrap_err();
        assert!(matches!(err, SyncError::InvalidState(_)));

        orchestrator.reset();
        assert!(orchestrator.run(&actual_catalog(), &mut executor).is_ok());
    }

    #[test]
    fn test_scoped_run_skips_global_steps() {
        let global = Rc::new(Cell::new(0));
        let scoped = Rc::new(Cell::new(0));
        let mut steps = StepRegistry::new();
        steps.register_global(counting("global", &global, false));
        steps.register_for("Customer", counting("customer", &scoped, false));

        let mut config = config(SyncMode::Update);
        config.sync.entities = vec!["Customer".to_string()];
        let mut orchestrator = Orchestrator::new(config, entities()).with_steps(steps);
        let result = orchestrator
            .run(&actual_catalog(), &mut RecordingExecutor::default())
            .unwrap();

        let names: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![SCHEMA_SYNC_STEP, "customer"]);
        assert_eq!(global.get(), 0);
        assert_eq!(scoped.get(), 1);
    }

    #[test]
    fn test_scoped_key_change_keeps_child_foreign_keys() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Create), entities());
        let mut applier = SchemaApplier::new(Schema::new());
        orchestrator.run(&EmptyCatalog, &mut applier).unwrap();
        let existing = applier.into_schema();

        let widened = EntityRegistry::from_descriptors([
            EntityDescriptor::new("Customer", "Customers")
                .field(FieldDescriptor::new("Id", DbType::Int64).key())
                .field(FieldDescriptor::new("Name", DbType::String).size(100)),
            EntityDescriptor::new("Order", "Orders")
                .field(FieldDescriptor::new("Id", DbType::Int32).key())
                .field(FieldDescriptor::new("CustomerId", DbType::Int32))
                .link(LinkDescriptor::new("FK_Orders_Customers", "Customer", ["CustomerId"])),
        ])
        .unwrap();
        let mut config = config(SyncMode::Update);
        config.sync.entities = vec!["Customer".to_string()];

        let catalog = DocumentCatalog::new(SchemaDocument::from_schema(&existing));
        let mut applier = SchemaApplier::new(existing);
        let mut orchestrator = Orchestrator::new(config, widened);
        orchestrator.run(&catalog, &mut applier).unwrap();

        let updated = applier.into_schema();
        assert_eq!(
            updated.table("Customers").unwrap().columns()[0].db_type,
            DbType::Int64
        );
        assert_eq!(updated.table("Orders").unwrap().links_to_parents().len(), 1);
    }

    #[test]
    fn test_prepare_failure_is_swallowed_and_listeners_fire() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Update), entities());
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        orchestrator.on_updated(move |_| counter.set(counter.get() + 1));
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&statuses);
        orchestrator.on_progress(move |p| seen.borrow_mut().push(p.status.clone()));

        let mut executor = RecordingExecutor {
            fail_prepare: true,
            ..Default::default()
        };
        orchestrator.run(&actual_catalog(), &mut executor).unwrap();

        assert_eq!(executor.units.len(), 3);
        assert_eq!(fired.get(), 1);
        assert_eq!(statuses.borrow().last().map(String::as_str), Some("Completed"));
        assert_eq!(orchestrator.progress().current, 1);
    }

    #[test]
    fn test_structural_error_raised_before_execution() {
        let entities = EntityRegistry::from_descriptors([EntityDescriptor::new("Order", "Orders")
            .field(FieldDescriptor::new("CustomerId", DbType::Int32))
            .link(LinkDescriptor::new("FK_Orders_Customers", "Customer", ["CustomerId"]))])
        .unwrap();
        let mut orchestrator = Orchestrator::new(config(SyncMode::Update), entities);
        let mut executor = RecordingExecutor::default();
        let err = orchestrator.run(&actual_catalog(), &mut executor).unwrap_err();
        assert!(matches!(err, SyncError::Structural(_)));
        assert!(executor.units.is_empty());
    }

    #[test]
    fn test_result_to_json() {
        let mut orchestrator = Orchestrator::new(config(SyncMode::Check), entities());
        let result = orchestrator
            .run(&actual_catalog(), &mut RecordingExecutor::default())
            .unwrap();
        let json = result.to_json().unwrap();
        assert!(json.contains("\"mode\": \"check\""));
        assert!(json.contains("\"run_id\""));
    }
}

//! Schema diffing and work-unit execution.
//!
//! - [`diff`]: compares desired and actual schemas
//! - [`work_unit`]: the structural change instructions and their ordering
//! - [`executor`]: the DDL execution boundary and an in-memory applier

pub mod diff;
pub mod executor;
pub mod work_unit;

pub use diff::{diff_schemas, plan_sync, DiffOptions};
pub use executor::{SchemaApplier, WorkUnitExecutor};
pub use work_unit::{sort_work_units, WorkUnit, WorkUnitKind};

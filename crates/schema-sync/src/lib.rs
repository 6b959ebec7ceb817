//! # schema-sync
//!
//! Schema synchronization engine.
//!
//! This library compares the schema an application's entities require with
//! the schema a database actually has, and produces the ordered structural
//! changes that bring the database into conformance:
//!
//! - **Non-destructive diff**: tables and columns are never dropped, lengths
//!   only widen
//! - **Dependent-object cascades**: indexes and foreign keys on an altered
//!   column are dropped and recreated around the alteration
//! - **Deterministic fixup** of display names, ordinals and link ownership
//! - **Persisted schema documents** (YAML/JSON) for overrides and previews
//! - **Step orchestration** with create, update and check modes
//!
//! ## Example
//!
//! ```rust,no_run
//! use schema_sync::{Config, DocumentCatalog, EntityRegistry, Orchestrator, SchemaApplier};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("sync.yaml")?;
//!     let entities = EntityRegistry::load("entities.yaml")?;
//!     let catalog = DocumentCatalog::from_path("actual.yaml")?;
//!     let mut executor = SchemaApplier::new(Default::default());
//!
//!     let mut orchestrator = Orchestrator::new(config, entities);
//!     let result = orchestrator.run(&catalog, &mut executor)?;
//!     println!("Applied {} work units", result.units_applied);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod entity;
pub mod error;
pub mod orchestrator;
pub mod sync;

// Re-exports for convenient access
pub use catalog::{CatalogColumnRow, CatalogFilter, CatalogReader, DocumentCatalog, EmptyCatalog};
pub use config::{CatalogConfig, Config, SyncConfig, SyncMode};
pub use core::{Column, DbType, ForeignKeyLink, Index, Schema, SchemaDocument, Table};
pub use entity::{EntityDescriptor, EntityRegistry, FieldDescriptor, IndexDescriptor, LinkDescriptor};
pub use error::{Result, SyncError};
pub use orchestrator::{
    MigrationStep, Orchestrator, RunState, StepContext, StepRegistry, StepReport, SyncResult,
};
pub use sync::{plan_sync, DiffOptions, SchemaApplier, WorkUnit, WorkUnitExecutor, WorkUnitKind};

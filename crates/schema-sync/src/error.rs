//! Error types for the schema synchronization library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for invalid input (bad arguments, unknown references).
pub const EXIT_INPUT_ERROR: u8 = 2;
/// Exit code for structural mismatches between entity metadata and schema.
pub const EXIT_STRUCTURAL_ERROR: u8 = 3;
/// Exit code for a failed migration step.
pub const EXIT_STEP_ERROR: u8 = 4;
/// Exit code for orchestration state violations.
pub const EXIT_STATE_ERROR: u8 = 5;
/// Exit code for serialization errors.
pub const EXIT_SERIALIZATION_ERROR: u8 = 6;
/// Exit code for IO errors (missing files, permissions).
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for schema synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Null/empty required argument or otherwise malformed input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A table referenced by name does not exist.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A column referenced by name does not exist on its table.
    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// A member with the same native name is already present in the collection.
    #[error("{kind} '{name}' already exists in {owner}")]
    DuplicateMember {
        kind: &'static str,
        name: String,
        owner: String,
    },

    /// Entity metadata does not line up with the schema being built.
    #[error("Structural mismatch: {0}")]
    Structural(String),

    /// A migration step failed during the apply phase.
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<SyncError>,
    },

    /// The orchestrator was driven from a state that does not allow the call.
    #[error("Invalid orchestrator state: {0}")]
    InvalidState(String),

    /// The DDL executor rejected a work unit.
    #[error("Executor error: {0}")]
    Executor(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create an UnknownColumn error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        SyncError::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a DuplicateMember error.
    pub fn duplicate(kind: &'static str, name: impl Into<String>, owner: impl Into<String>) -> Self {
        SyncError::DuplicateMember {
            kind,
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Wrap an error raised while running a named step.
    pub fn step(step: impl Into<String>, source: SyncError) -> Self {
        SyncError::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Name of the failing step, if this is a step failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            SyncError::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Map the error category to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => EXIT_CONFIG_ERROR,
            SyncError::InvalidInput(_)
            | SyncError::UnknownTable(_)
            | SyncError::UnknownColumn { .. }
            | SyncError::DuplicateMember { .. } => EXIT_INPUT_ERROR,
            SyncError::Structural(_) => EXIT_STRUCTURAL_ERROR,
            SyncError::Step { .. } | SyncError::Executor(_) => EXIT_STEP_ERROR,
            SyncError::InvalidState(_) => EXIT_STATE_ERROR,
            SyncError::Json(_) => EXIT_SERIALIZATION_ERROR,
            SyncError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schema synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_names_step_and_cause() {
        let err = SyncError::step("sync-schema", SyncError::Executor("boom".into()));
        assert_eq!(err.failed_step(), Some("sync-schema"));
        assert!(err.to_string().contains("sync-schema"));
        assert!(err.to_string().contains("boom"));

        let detailed = err.format_detailed();
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("Executor error: boom"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            SyncError::unknown_column("T", "C").exit_code(),
            EXIT_INPUT_ERROR
        );
        assert_eq!(
            SyncError::Structural("x".into()).exit_code(),
            EXIT_STRUCTURAL_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(SyncError::from(io).exit_code(), EXIT_IO_ERROR);
    }
}

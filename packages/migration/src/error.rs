use std::path::PathBuf;

use sea_orm::{DbBackend, DbErr};
use thiserror::Error;

/// Everything that can stop a reconciliation run.
///
/// None of these are recovered from inside the engine. Migrations committed
/// before the failure stay committed, so a fixed re-run picks up where this
/// one stopped.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("unable to read datatype of {table}.version: {source}")]
    SchemaInspectionFailed {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("no schema inspector for database backend {backend:?}")]
    UnsupportedBackend { backend: DbBackend },

    #[error("failed to create migrations table {table}: {source}")]
    MetaTableCreateFailed {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("unable to read max legacy version from {table}: {source}")]
    LegacyVersionReadFailed {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error(
        "unable to upgrade migration system: expected database to be at legacy migration {available}, but it is at {applied}"
    )]
    SwitchoverVersionMismatch { applied: i64, available: i64 },

    #[error("switchover from legacy migration table {table} failed: {source}")]
    SwitchoverFailed {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("failed to read applied migrations from {table}: {source}")]
    AppliedSetReadFailed {
        table: String,
        #[source]
        source: DbErr,
    },

    #[error("error reading migration file {}: {source}", file.display())]
    MigrationReadFailed {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration {} failed: {source}", file.display())]
    MigrationApplyFailed {
        file: PathBuf,
        #[source]
        source: DbErr,
    },

    #[error("no SQL files found in {}", dir.display())]
    NoMigrationFilesFound { dir: PathBuf },

    #[error("error scanning {}: {source}", dir.display())]
    DirectoryScanFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a migration file (expected <name>.sql): {}", path.display())]
    InvalidMigrationFile { path: PathBuf },

    #[error("two migration files map to the same migration name '{name}'")]
    DuplicateMigrationName { name: String },

    #[error("invalid migrations table name '{name}'")]
    InvalidTableName { name: String },
}

impl MigrationError {
    /// The migration file this error is about, if any.
    pub fn file(&self) -> Option<&std::path::Path> {
        match self {
            MigrationError::MigrationReadFailed { file, .. }
            | MigrationError::MigrationApplyFailed { file, .. } => Some(file),
            _ => None,
        }
    }
}

//! SQL-file migration engine with a one-time switchover from the legacy
//! integer-keyed tracker.

pub use sea_orm::{ConnectionTrait, DatabaseConnection};

pub mod config;
pub mod engine;
pub mod error;
pub mod file;
pub mod inspect;
pub mod state;

pub use config::EngineConfig;
pub use engine::{
    count_applied_migrations, reconcile, status, MigrationStatus, Outcome, ReconcileReport,
    SwitchoverCheck,
};
pub use error::MigrationError;
pub use file::{discover_migration_files, MigrationFile, MigrationSet};
pub use inspect::detect_state;
pub use state::DbState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    /// Reconcile the database with the migration set.
    Up,
    /// Report state and pending migrations without writing.
    Status,
}

/// Result of [`migrate`], one variant per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationSummary {
    Up(ReconcileReport),
    Status(MigrationStatus),
}

/// Run `command` against an open connection.
/// Used by both the CLI orchestration and tests.
pub async fn migrate(
    db: &DatabaseConnection,
    set: &MigrationSet,
    command: MigrationCommand,
    config: &EngineConfig,
) -> Result<MigrationSummary, MigrationError> {
    let backend = db.get_database_backend();
    let applied_before = count_applied_migrations(db, config).await?;

    tracing::info!("▶ cmd={command:?}  backend={backend:?}  table={}", config.table());
    tracing::info!(
        "▶ BEFORE: {} migration file(s) available, {} recorded",
        set.len(),
        applied_before
    );

    let result = match command {
        MigrationCommand::Up => reconcile(db, set, config).await.map(MigrationSummary::Up),
        MigrationCommand::Status => status(db, set, config).await.map(MigrationSummary::Status),
    };

    match result {
        Ok(summary) => {
            if matches!(command, MigrationCommand::Up) {
                let applied_after = count_applied_migrations(db, config).await?;
                tracing::info!(
                    "▶ AFTER: {} migration file(s) available, {} recorded",
                    set.len(),
                    applied_after
                );
            }
            tracing::info!("✅ {command:?} OK");
            Ok(summary)
        }
        Err(e) => {
            tracing::error!("❌ {command:?} failed: {e}");
            Err(e)
        }
    }
}

//! Catalog adapters that report the declared type of the tracking table's
//! `version` column.
//!
//! Reconciliation only ever sees the resulting [`DbState`]; each backend
//! supplies its own catalog query here.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, Statement};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::MigrationError;
use crate::state::DbState;

/// Reads the declared type of `<table>.version`.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// `Ok(None)` when the table (or its `version` column) does not exist.
    async fn version_column_type(
        &self,
        db: &DatabaseConnection,
        table: &str,
    ) -> Result<Option<String>, DbErr>;
}

/// PostgreSQL: `information_schema.columns` in the connection's current schema.
pub struct PostgresInspector;

#[async_trait]
impl SchemaInspector for PostgresInspector {
    async fn version_column_type(
        &self,
        db: &DatabaseConnection,
        table: &str,
    ) -> Result<Option<String>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT data_type::text AS data_type \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = 'version'",
            [table.into()],
        );
        match db.query_one(stmt).await? {
            Some(row) => Ok(Some(row.try_get("", "data_type")?)),
            None => Ok(None),
        }
    }
}

/// SQLite: `pragma_table_info`, which echoes the type as declared.
pub struct SqliteInspector;

#[async_trait]
impl SchemaInspector for SqliteInspector {
    async fn version_column_type(
        &self,
        db: &DatabaseConnection,
        table: &str,
    ) -> Result<Option<String>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "SELECT type AS data_type FROM pragma_table_info(?) WHERE name = 'version'",
            [table.into()],
        );
        match db.query_one(stmt).await? {
            Some(row) => Ok(Some(row.try_get("", "data_type")?)),
            None => Ok(None),
        }
    }
}

/// Pick the inspector matching the connection's backend.
pub fn inspector_for(backend: DbBackend) -> Result<Box<dyn SchemaInspector>, MigrationError> {
    match backend {
        DbBackend::Postgres => Ok(Box::new(PostgresInspector)),
        DbBackend::Sqlite => Ok(Box::new(SqliteInspector)),
        other => Err(MigrationError::UnsupportedBackend { backend: other }),
    }
}

/// Work out which tracking scheme `db` is under.
pub async fn detect_state(
    db: &DatabaseConnection,
    config: &EngineConfig,
) -> Result<DbState, MigrationError> {
    let inspector = inspector_for(db.get_database_backend())?;
    let type_name = inspector
        .version_column_type(db, config.table())
        .await
        .map_err(|source| MigrationError::SchemaInspectionFailed {
            table: config.table().to_string(),
            source,
        })?;

    let state = DbState::from_version_column_type(type_name.as_deref());
    debug!(
        table = config.table(),
        version_type = type_name.as_deref().unwrap_or("<absent>"),
        state = %state,
        "detected migration state"
    );
    Ok(state)
}

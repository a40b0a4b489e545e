//! Reconciliation of a database against a [`MigrationSet`].
//!
//! A run detects the tracking state, brings the database to the current
//! string-keyed schema (initializing a fresh database or switching over from
//! the legacy tracker), then applies every missing migration in set order.
//! Each migration commits on its own; a failure stops the run and leaves the
//! earlier ones in place.

use std::collections::BTreeSet;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, Statement,
    TransactionTrait,
};
use sea_orm_migration::sea_query::{Alias, ColumnDef, Query, Table};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::MigrationError;
use crate::file::{MigrationFile, MigrationSet};
use crate::inspect::detect_state;
use crate::state::DbState;

const VERSION_COLUMN: &str = "version";

/// Whether a run did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    UpToDate,
    Applied(usize),
}

/// What a reconciliation run did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub initial_state: DbState,
    /// Legacy migrations recorded (not executed) by the switchover.
    pub recorded: Vec<String>,
    /// Legacy migrations executed while initializing a fresh database.
    pub replayed: Vec<String>,
    /// Migrations executed after the database reached the current schema.
    pub applied: Vec<String>,
}

impl ReconcileReport {
    fn new(initial_state: DbState) -> Self {
        Self {
            initial_state,
            recorded: Vec::new(),
            replayed: Vec::new(),
            applied: Vec::new(),
        }
    }

    pub fn switched_over(&self) -> bool {
        self.initial_state == DbState::Legacy
    }

    /// Migrations whose SQL ran during this run, in execution order.
    pub fn executed(&self) -> impl Iterator<Item = &str> {
        self.replayed
            .iter()
            .chain(self.applied.iter())
            .map(String::as_str)
    }

    pub fn outcome(&self) -> Outcome {
        match self.replayed.len() + self.applied.len() {
            0 => Outcome::UpToDate,
            n => Outcome::Applied(n),
        }
    }
}

/// Legacy table maximum against the highest legacy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchoverCheck {
    pub applied: i64,
    pub available: i64,
}

impl SwitchoverCheck {
    pub fn ready(&self) -> bool {
        self.applied == self.available
    }
}

/// Read-only view of what an upgrade would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub state: DbState,
    /// Names an upgrade would execute or, for legacy databases, execute after
    /// the switchover.
    pub pending: Vec<String>,
    /// Present only for legacy databases.
    pub switchover: Option<SwitchoverCheck>,
}

/// Bring `db` up to date with `set`.
pub async fn reconcile(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<ReconcileReport, MigrationError> {
    let state = detect_state(db, config).await?;
    info!(state = %state, table = config.table(), "migration state detected");

    let mut report = ReconcileReport::new(state);
    match state {
        DbState::Fresh => {
            info!("Initializing new database");
            create_meta_table(db, config)
                .await
                .map_err(|source| MigrationError::MetaTableCreateFailed {
                    table: config.table().to_string(),
                    source,
                })?;
            info!("Running legacy migrations (ie 0000-*.sql)");
            report.replayed = replay_legacy(db, set, config).await?;
        }
        DbState::Legacy => {
            info!("Switching over from legacy migration system");
            report.recorded = switchover_from_legacy(db, set, config).await?;
        }
        DbState::Current => {}
    }

    report.applied = apply_missing(db, set, config).await?;

    match report.outcome() {
        Outcome::UpToDate => info!("Database is up to date"),
        Outcome::Applied(n) => info!(count = n, "migrations applied"),
    }
    Ok(report)
}

/// Replace the legacy integer table with the current one.
///
/// The legacy table's highest version must equal the highest legacy file;
/// otherwise the database either has legacy migrations pending or is ahead of
/// this file set, and nothing is touched. On success every legacy file is
/// recorded as applied without running its SQL. Returns the recorded names.
pub async fn switchover_from_legacy(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<Vec<String>, MigrationError> {
    let check = switchover_check(db, set, config).await?;
    if !check.ready() {
        return Err(MigrationError::SwitchoverVersionMismatch {
            applied: check.applied,
            available: check.available,
        });
    }
    info!(legacy_version = check.applied, "Found legacy DB version");

    let switch_err = |source| MigrationError::SwitchoverFailed {
        table: config.table().to_string(),
        source,
    };

    let txn = db.begin().await.map_err(switch_err)?;

    match replace_legacy_table(&txn, set, config).await {
        Ok(recorded) => {
            txn.commit().await.map_err(switch_err)?;
            info!(recorded = recorded.len(), "Legacy switchover complete");
            Ok(recorded)
        }
        Err(source) => {
            let _ = txn.rollback().await;
            Err(switch_err(source))
        }
    }
}

async fn replace_legacy_table(
    txn: &DatabaseTransaction,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<Vec<String>, DbErr> {
    let backend = txn.get_database_backend();
    let drop = Table::drop().table(Alias::new(config.table())).to_owned();
    txn.execute(backend.build(&drop)).await?;
    create_meta_table(txn, config).await?;

    info!("Inserting legacy migrations into the migrations table (without running them)");
    let mut recorded = Vec::new();
    for file in set.legacy() {
        txn.execute(insert_name_stmt(backend, config, file.name())?)
            .await?;
        recorded.push(file.name().to_string());
    }
    Ok(recorded)
}

async fn switchover_check(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<SwitchoverCheck, MigrationError> {
    let applied = read_max_legacy_version(db, config).await?;
    Ok(SwitchoverCheck {
        applied,
        available: set.max_legacy_version(),
    })
}

/// `MAX(version)` of the legacy table; an empty table reads as 0.
pub async fn read_max_legacy_version(
    db: &DatabaseConnection,
    config: &EngineConfig,
) -> Result<i64, MigrationError> {
    let read_err = |source| MigrationError::LegacyVersionReadFailed {
        table: config.table().to_string(),
        source,
    };

    let stmt = Statement::from_string(
        db.get_database_backend(),
        format!(
            r#"SELECT CAST(MAX("{VERSION_COLUMN}") AS BIGINT) AS max_version FROM "{}""#,
            config.table()
        ),
    );
    let row = db.query_one(stmt).await.map_err(read_err)?;
    let max = match row {
        Some(row) => row
            .try_get::<Option<i64>>("", "max_version")
            .map_err(read_err)?,
        None => None,
    };
    Ok(max.unwrap_or(0))
}

/// Names recorded in the current-schema table.
pub async fn applied_migrations(
    db: &DatabaseConnection,
    config: &EngineConfig,
) -> Result<BTreeSet<String>, MigrationError> {
    let read_err = |source| MigrationError::AppliedSetReadFailed {
        table: config.table().to_string(),
        source,
    };

    let select = Query::select()
        .column(Alias::new(VERSION_COLUMN))
        .from(Alias::new(config.table()))
        .to_owned();
    let rows = db
        .query_all(db.get_database_backend().build(&select))
        .await
        .map_err(read_err)?;

    rows.iter()
        .map(|row| row.try_get::<String>("", VERSION_COLUMN).map_err(read_err))
        .collect()
}

/// Apply every file in `set` not yet recorded, in set order.
///
/// Returns the names applied; empty when the database was already up to date.
pub async fn apply_missing(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<Vec<String>, MigrationError> {
    let existing = applied_migrations(db, config).await?;
    debug!(applied = existing.len(), available = set.len(), "computing pending migrations");

    let mut applied = Vec::new();
    for file in set.iter().filter(|f| !existing.contains(f.name())) {
        apply_migration(db, file, config).await?;
        applied.push(file.name().to_string());
    }
    Ok(applied)
}

/// Run the legacy files of `set` in order on a freshly initialized database.
pub async fn replay_legacy(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<Vec<String>, MigrationError> {
    let mut replayed = Vec::new();
    for file in set.legacy() {
        apply_migration(db, file, config).await?;
        replayed.push(file.name().to_string());
    }
    Ok(replayed)
}

/// Execute one migration file and record it, in a single transaction.
pub async fn apply_migration(
    db: &DatabaseConnection,
    file: &MigrationFile,
    config: &EngineConfig,
) -> Result<(), MigrationError> {
    let sql = tokio::fs::read_to_string(file.path())
        .await
        .map_err(|source| MigrationError::MigrationReadFailed {
            file: file.path().to_path_buf(),
            source,
        })?;

    let apply_err = |source| MigrationError::MigrationApplyFailed {
        file: file.path().to_path_buf(),
        source,
    };

    info!(migration = file.name(), "Running migration");
    let txn = db.begin().await.map_err(apply_err)?;

    let body = async {
        txn.execute_unprepared(&sql).await?;
        let backend = txn.get_database_backend();
        txn.execute(insert_name_stmt(backend, config, file.name())?)
            .await?;
        Ok::<(), DbErr>(())
    };

    match body.await {
        Ok(()) => txn.commit().await.map_err(apply_err),
        Err(source) => {
            let _ = txn.rollback().await;
            Err(apply_err(source))
        }
    }
}

/// Create the current-schema tracking table.
async fn create_meta_table<C>(conn: &C, config: &EngineConfig) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let create = Table::create()
        .table(Alias::new(config.table()))
        .col(
            ColumnDef::new(Alias::new(VERSION_COLUMN))
                .string()
                .not_null()
                .primary_key(),
        )
        .to_owned();
    conn.execute(conn.get_database_backend().build(&create))
        .await?;
    Ok(())
}

fn insert_name_stmt(
    backend: DbBackend,
    config: &EngineConfig,
    name: &str,
) -> Result<Statement, DbErr> {
    let insert = Query::insert()
        .into_table(Alias::new(config.table()))
        .columns([Alias::new(VERSION_COLUMN)])
        .values([name.into()])
        .map_err(|e| DbErr::Custom(format!("failed to build insert for {name}: {e}")))?
        .to_owned();
    Ok(backend.build(&insert))
}

/// Report what [`reconcile`] would do without writing anything.
pub async fn status(
    db: &DatabaseConnection,
    set: &MigrationSet,
    config: &EngineConfig,
) -> Result<MigrationStatus, MigrationError> {
    let state = detect_state(db, config).await?;

    let (pending, switchover) = match state {
        DbState::Fresh => (set.iter().map(|f| f.name().to_string()).collect(), None),
        DbState::Legacy => {
            let check = switchover_check(db, set, config).await?;
            let pending = set
                .iter()
                .filter(|f| !f.is_legacy())
                .map(|f| f.name().to_string())
                .collect();
            (pending, Some(check))
        }
        DbState::Current => {
            let existing = applied_migrations(db, config).await?;
            let pending = set
                .iter()
                .filter(|f| !existing.contains(f.name()))
                .map(|f| f.name().to_string())
                .collect();
            (pending, None)
        }
    };

    Ok(MigrationStatus {
        state,
        pending,
        switchover,
    })
}

/// Number of rows in the tracking table, 0 when it does not exist yet.
pub async fn count_applied_migrations(
    db: &DatabaseConnection,
    config: &EngineConfig,
) -> Result<usize, MigrationError> {
    if detect_state(db, config).await? == DbState::Fresh {
        return Ok(0);
    }

    let read_err = |source| MigrationError::AppliedSetReadFailed {
        table: config.table().to_string(),
        source,
    };
    let stmt = Statement::from_string(
        db.get_database_backend(),
        format!(r#"SELECT COUNT(*) AS cnt FROM "{}""#, config.table()),
    );
    let count = match db.query_one(stmt).await.map_err(read_err)? {
        Some(row) => row.try_get::<i64>("", "cnt").map_err(read_err)?,
        None => 0,
    };
    Ok(usize::try_from(count).unwrap_or(0))
}

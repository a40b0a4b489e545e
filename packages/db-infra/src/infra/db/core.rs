use std::time::Duration;

use migration::{migrate, EngineConfig, MigrationCommand, MigrationSet, MigrationSummary};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{debug, info, warn};

use crate::config::db::{validate_database_name, ConnDescriptor};
use crate::error::{CreationStep, DbInfraError};

/// Overrides [`DEFAULT_ACQUIRE_MS`] for every connection the migrator opens.
pub const CONNECT_TIMEOUT_ENV: &str = "MIGRATOR_CONNECT_TIMEOUT_MS";

const DEFAULT_ACQUIRE_MS: u64 = 5000;

fn acquire_timeout() -> Duration {
    let ms = std::env::var(CONNECT_TIMEOUT_ENV)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ACQUIRE_MS);
    Duration::from_millis(ms)
}

/// Single-connection pool options: a run holds exactly one session.
fn connect_options(con: &ConnDescriptor) -> ConnectOptions {
    let timeout = acquire_timeout();
    let mut opt = ConnectOptions::new(con.connection_url());
    opt.min_connections(1)
        .max_connections(1)
        .connect_timeout(timeout)
        .acquire_timeout(timeout)
        .sqlx_logging(true);
    opt
}

/// Open `con` and run a trivial query so a dead server fails here rather
/// than on the first real statement.
async fn connect_and_probe(con: &ConnDescriptor) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(connect_options(con)).await?;
    if let Err(e) = db.execute_unprepared("SELECT 1").await {
        let _ = db.close().await;
        return Err(e);
    }
    Ok(db)
}

/// Connect to an existing database.
pub async fn connect(con: &ConnDescriptor) -> Result<DatabaseConnection, DbInfraError> {
    let db = connect_and_probe(con)
        .await
        .map_err(|source| DbInfraError::ConnectFailed {
            database: con.identity(),
            source,
        })?;
    debug!("Connected to database {}", con.database());
    Ok(db)
}

/// Connect to `con`, creating the database first when it cannot be reached.
///
/// Creation goes through [`ADMIN_DATABASE`](crate::config::db::ADMIN_DATABASE)
/// with an unquoted `CREATE DATABASE`, so the name must already have passed
/// [`validate_database_name`].
pub async fn connect_or_create(con: &ConnDescriptor) -> Result<DatabaseConnection, DbInfraError> {
    match connect_and_probe(con).await {
        Ok(db) => {
            debug!("Connected to database {}", con.database());
            return Ok(db);
        }
        Err(e) => {
            debug!(database = %con.identity(), error = %e, "database not reachable, trying to create it");
        }
    }

    let creation_err = |step| {
        move |source| DbInfraError::DatabaseCreationFailed {
            database: con.identity(),
            step,
            source,
        }
    };

    let admin = Database::connect(connect_options(&con.admin()))
        .await
        .map_err(creation_err(CreationStep::ConnectAdmin))?;

    info!("Creating database {}", con.database());
    let created = admin
        .execute_unprepared(&format!("CREATE DATABASE {}", con.database()))
        .await;
    if let Err(e) = admin.close().await {
        warn!(error = %e, "failed to close administrative connection");
    }
    created.map_err(creation_err(CreationStep::CreateDatabase))?;

    connect_and_probe(con)
        .await
        .map_err(creation_err(CreationStep::ConnectCreated))
}

/// Resolve `con`, run `command` against it with `set`, then release the
/// connection.
///
/// `Up` creates the database when needed; `Status` only connects.
pub async fn orchestrate_migration(
    con: &ConnDescriptor,
    set: &MigrationSet,
    command: MigrationCommand,
    config: &EngineConfig,
) -> Result<MigrationSummary, DbInfraError> {
    validate_database_name(con.database())?;

    info!(
        "migrate=start db={} cmd={:?} files={} table={}",
        con.identity(),
        command,
        set.len(),
        config.table()
    );

    let db = match command {
        MigrationCommand::Up => connect_or_create(con).await?,
        MigrationCommand::Status => connect(con).await?,
    };

    let result = migrate(&db, set, command, config).await;

    if let Err(e) = db.close().await {
        warn!(error = %e, "failed to close database connection");
    }
    info!("migrate=done");

    Ok(result?)
}

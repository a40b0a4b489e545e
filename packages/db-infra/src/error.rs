use std::fmt;

use migration::MigrationError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbInfraError {
    #[error("Invalid db connection string. Expected 6 colon-separated parts, but got {fields} parts")]
    MalformedConnectionString { fields: usize },

    #[error("Postgres is the only supported database (not {driver})")]
    UnsupportedDriver { driver: String },

    #[error("Invalid db name '{name}'. Must be ASCII letters, digits, '_' or '-' only")]
    InvalidDatabaseName { name: String },

    #[error("Failed to connect to database {database}: {source}")]
    ConnectFailed {
        database: String,
        #[source]
        source: DbErr,
    },

    #[error("Failed to create database {database} ({step}): {source}")]
    DatabaseCreationFailed {
        database: String,
        step: CreationStep,
        #[source]
        source: DbErr,
    },

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Where connect-or-create gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStep {
    ConnectAdmin,
    CreateDatabase,
    ConnectCreated,
}

impl fmt::Display for CreationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreationStep::ConnectAdmin => "connecting to the administrative database",
            CreationStep::CreateDatabase => "running CREATE DATABASE",
            CreationStep::ConnectCreated => "connecting to the newly created database",
        };
        f.write_str(s)
    }
}

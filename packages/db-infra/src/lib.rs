//! Connection resolution and migration orchestration.
//! Used by the migration CLI.

pub mod config;
pub mod error;
pub mod infra;

pub use config::db;
pub use error::{CreationStep, DbInfraError};
pub use infra::db::core::{connect, connect_or_create, orchestrate_migration};

//! Test support utilities
//!
//! Unique names for test databases, throwaway SQLite databases, on-disk
//! migration directories and idempotent logging setup.

pub mod fixtures;
pub mod logging;

pub use fixtures::{sqlite_db, MigrationDir, SqliteDb};

use ulid::Ulid;

/// Generate a unique database name usable unquoted in `CREATE DATABASE`
///
/// # Returns
/// A lowercase name in the format `{prefix}_{ulid}`
///
/// # Examples
/// ```
/// use test_support::unique_db_name;
///
/// let name = unique_db_name("migrator_test");
/// assert!(name.starts_with("migrator_test_"));
/// assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
/// ```
pub fn unique_db_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string().to_lowercase())
}

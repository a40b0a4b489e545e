use std::sync::OnceLock;

use regex::Regex;

use crate::error::MigrationError;

/// Name of the tracking table when nothing else is configured.
pub const DEFAULT_TABLE: &str = "schema_migrations";

/// Environment variable that overrides [`DEFAULT_TABLE`] in [`EngineConfig::from_env`].
pub const TABLE_ENV: &str = "MIGRATOR_TABLE";

fn table_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*$").expect("static regex"))
}

/// Settings the reconciliation engine runs with.
///
/// Passed explicitly into every engine entry point; the engine reads no
/// globals of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    table: String,
}

impl EngineConfig {
    /// Build a config tracking migrations in `table`.
    ///
    /// The name is interpolated into catalog queries, so only plain
    /// identifiers are accepted.
    pub fn new(table: impl Into<String>) -> Result<Self, MigrationError> {
        let table = table.into();
        if !table_name_re().is_match(&table) {
            return Err(MigrationError::InvalidTableName { name: table });
        }
        Ok(Self { table })
    }

    /// Config from `MIGRATOR_TABLE`, falling back to `schema_migrations`.
    pub fn from_env() -> Result<Self, MigrationError> {
        match std::env::var(TABLE_ENV).ok().filter(|s| !s.is_empty()) {
            Some(table) => Self::new(table),
            None => Ok(Self::default()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

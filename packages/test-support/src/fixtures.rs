//! Throwaway databases and migration directories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use tempfile::TempDir;

/// A file-backed SQLite database that lives as long as this value.
pub struct SqliteDb {
    pub conn: DatabaseConnection,
    _dir: TempDir,
}

/// Create an empty SQLite database in a fresh temp directory.
///
/// The pool holds a single connection, like the migration runner's own.
pub async fn sqlite_db() -> SqliteDb {
    let dir = tempfile::tempdir().expect("create temp dir for sqlite db");
    let path = dir.path().join("migrations_test.db");
    let conn = connect(&path).await;
    SqliteDb { conn, _dir: dir }
}

async fn connect(path: &Path) -> DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let mut opt = ConnectOptions::new(url);
    opt.min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    Database::connect(opt)
        .await
        .expect("connect to temp sqlite db")
}

impl SqliteDb {
    /// Execute raw SQL, panicking on failure.
    pub async fn exec(&self, sql: &str) {
        self.conn
            .execute_unprepared(sql)
            .await
            .unwrap_or_else(|e| panic!("failed to execute {sql:?}: {e}"));
    }

    /// Return one text column of every row produced by `sql`.
    pub async fn strings(&self, sql: &str, column: &str) -> Vec<String> {
        let rows = self
            .conn
            .query_all(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .unwrap_or_else(|e| panic!("failed to query {sql:?}: {e}"));
        rows.iter()
            .map(|row| {
                row.try_get::<String>("", column)
                    .unwrap_or_else(|e| panic!("column {column} of {sql:?}: {e}"))
            })
            .collect()
    }

    /// Return one integer column of every row produced by `sql`.
    pub async fn ints(&self, sql: &str, column: &str) -> Vec<i64> {
        let rows = self
            .conn
            .query_all(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .unwrap_or_else(|e| panic!("failed to query {sql:?}: {e}"));
        rows.iter()
            .map(|row| {
                row.try_get::<i64>("", column)
                    .unwrap_or_else(|e| panic!("column {column} of {sql:?}: {e}"))
            })
            .collect()
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        let sql = format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '{table}'"
        );
        !self.strings(&sql, "name").await.is_empty()
    }

    /// Declared type of `<table>.<column>`, as SQLite reports it.
    pub async fn column_type(&self, table: &str, column: &str) -> Option<String> {
        let sql = format!("SELECT type FROM pragma_table_info('{table}') WHERE name = '{column}'");
        self.strings(&sql, "type").await.into_iter().next()
    }
}

/// A temp directory of `.sql` files.
pub struct MigrationDir {
    dir: TempDir,
}

impl MigrationDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp migrations dir"),
        }
    }

    /// Build a directory holding `files` as `(basename, sql)` pairs.
    pub fn with_files<S: AsRef<str>>(files: &[(&str, S)]) -> Self {
        let dir = Self::new();
        for (name, sql) in files {
            dir.write(name, sql.as_ref());
        }
        dir
    }

    /// Write (or overwrite) one file and return its path.
    pub fn write(&self, name: &str, sql: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, sql)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
        path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for MigrationDir {
    fn default() -> Self {
        Self::new()
    }
}

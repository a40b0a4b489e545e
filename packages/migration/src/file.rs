//! Migration files and the order they run in.
//!
//! Two naming grammars share one directory:
//!
//! - legacy files, `0000-NNNN.sql` with 1 to 4 digits, carried over from the
//!   integer-keyed tracker;
//! - standard files, any other `*.sql`.
//!
//! Every file is identified by its migration name (lowercased basename without
//! `.sql`), and all files run in byte-wise order of their basenames.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::MigrationError;

const SQL_SUFFIX: &str = ".sql";
const LEGACY_PREFIX: &str = "0000-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    path: PathBuf,
    basename: String,
    name: String,
    legacy_version: Option<i64>,
}

impl MigrationFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let path = path.into();
        let basename = match path.file_name().and_then(|n| n.to_str()) {
            Some(b) if b.len() > SQL_SUFFIX.len() && b.ends_with(SQL_SUFFIX) => b.to_string(),
            _ => return Err(MigrationError::InvalidMigrationFile { path }),
        };
        let stem = &basename[..basename.len() - SQL_SUFFIX.len()];
        let name = stem.to_lowercase();
        let legacy_version = legacy_version(stem);

        Ok(Self {
            path,
            basename,
            name,
            legacy_version,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Key recorded in the tracking table.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn legacy_version(&self) -> Option<i64> {
        self.legacy_version
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy_version.is_some()
    }
}

/// Parse the `NNNN` of a `0000-NNNN` stem.
fn legacy_version(stem: &str) -> Option<i64> {
    let digits = stem.strip_prefix(LEGACY_PREFIX)?;
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The files of one run, sorted by basename.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    files: Vec<MigrationFile>,
}

impl MigrationSet {
    pub fn from_paths<I, P>(paths: I) -> Result<Self, MigrationError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut files = paths
            .into_iter()
            .map(MigrationFile::from_path)
            .collect::<Result<Vec<_>, _>>()?;
        files.sort_by(|a, b| a.basename.as_bytes().cmp(b.basename.as_bytes()));

        let mut seen = HashSet::new();
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(MigrationError::DuplicateMigrationName {
                    name: file.name.clone(),
                });
            }
        }

        Ok(Self { files })
    }

    /// Walk `dir` (one level) and build the set from its `*.sql` files.
    pub fn discover(dir: &Path) -> Result<Self, MigrationError> {
        Self::from_paths(discover_migration_files(dir)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationFile> {
        self.files.iter()
    }

    pub fn legacy(&self) -> impl Iterator<Item = &MigrationFile> {
        self.files.iter().filter(|f| f.is_legacy())
    }

    /// Highest legacy version present, 0 if there are no legacy files.
    pub fn max_legacy_version(&self) -> i64 {
        self.legacy()
            .filter_map(MigrationFile::legacy_version)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Collect the `*.sql` files directly inside `dir`, sorted by basename.
///
/// Subdirectories are not entered.
pub fn discover_migration_files(dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    let scan_err = |source| MigrationError::DirectoryScanFailed {
        dir: dir.to_path_buf(),
        source,
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        if !entry.file_type().map_err(scan_err)?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            found.push(path);
        }
    }

    if found.is_empty() {
        return Err(MigrationError::NoMigrationFilesFound {
            dir: dir.to_path_buf(),
        });
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = found.len(), "discovered migration files");
    Ok(found)
}

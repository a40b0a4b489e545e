use std::fmt;

/// Which tracking scheme a database is under.
///
/// Derived on every run from the declared type of the tracking table's
/// `version` column; nothing else marks the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    /// No tracking table.
    Fresh,
    /// Integer `version` column, owned by the legacy tracker.
    Legacy,
    /// String `version` column, owned by this engine.
    Current,
}

impl DbState {
    /// Map the backend-reported type of `version` to a state.
    ///
    /// `None` means the column (and so the table) does not exist. Any type
    /// whose name contains `char` (`character varying`, `varchar`, ...) or is
    /// `text` is a string column; every other type is treated as the legacy
    /// integer column.
    pub fn from_version_column_type(type_name: Option<&str>) -> Self {
        let Some(type_name) = type_name else {
            return DbState::Fresh;
        };
        let lowered = type_name.trim().to_ascii_lowercase();
        if lowered.contains("char") || lowered == "text" {
            DbState::Current
        } else {
            DbState::Legacy
        }
    }
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbState::Fresh => "fresh",
            DbState::Legacy => "legacy",
            DbState::Current => "current",
        };
        f.write_str(s)
    }
}

use std::fmt;
use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::error::DbInfraError;

/// The only driver the descriptor accepts.
pub const SUPPORTED_DRIVER: &str = "postgres";

/// Database connected to when the target has to be created.
pub const ADMIN_DATABASE: &str = "postgres";

pub const DEFAULT_SSLMODE: &str = "disable";

/// Environment variable consulted by [`sslmode_from_env`].
pub const SSLMODE_ENV: &str = "MIGRATOR_SSLMODE";

const FIELD_COUNT: usize = 6;

// Unreserved URL characters pass through; everything else in user, password
// and database name is escaped.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn db_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[_\-a-zA-Z0-9]+$").expect("static regex"))
}

/// Check a database name before it can reach an unquoted `CREATE DATABASE`.
///
/// Accepts `-` and uppercase letters although the unquoted statement does not
/// handle them: a hyphen is a syntax error, and uppercase is folded to
/// lowercase so the reconnect to the original name fails.
pub fn validate_database_name(name: &str) -> Result<(), DbInfraError> {
    if db_name_re().is_match(name) {
        Ok(())
    } else {
        Err(DbInfraError::InvalidDatabaseName {
            name: name.to_string(),
        })
    }
}

/// `MIGRATOR_SSLMODE`, when set and non-empty.
pub fn sslmode_from_env() -> Option<String> {
    std::env::var(SSLMODE_ENV).ok().filter(|s| !s.is_empty())
}

/// Parsed `driver:host:port:dbname:user:password` descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnDescriptor {
    driver: String,
    host: String,
    port: String,
    dbname: String,
    user: String,
    password: String,
    sslmode: Option<String>,
}

impl ConnDescriptor {
    /// Split a descriptor into its six fields.
    ///
    /// Colons cannot be escaped, so no field may contain one.
    pub fn parse(s: &str) -> Result<Self, DbInfraError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != FIELD_COUNT {
            return Err(DbInfraError::MalformedConnectionString {
                fields: parts.len(),
            });
        }
        if parts[0] != SUPPORTED_DRIVER {
            return Err(DbInfraError::UnsupportedDriver {
                driver: parts[0].to_string(),
            });
        }

        Ok(Self {
            driver: parts[0].to_string(),
            host: parts[1].to_string(),
            port: parts[2].to_string(),
            dbname: parts[3].to_string(),
            user: parts[4].to_string(),
            password: parts[5].to_string(),
            sslmode: None,
        })
    }

    pub fn with_sslmode(mut self, sslmode: impl Into<String>) -> Self {
        self.sslmode = Some(sslmode.into());
        self
    }

    /// Same server and credentials, pointed at [`ADMIN_DATABASE`].
    pub fn admin(&self) -> Self {
        Self {
            dbname: ADMIN_DATABASE.to_string(),
            ..self.clone()
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `None` when the field is empty or `0`.
    pub fn port(&self) -> Option<&str> {
        match self.port.as_str() {
            "" | "0" => None,
            p => Some(p),
        }
    }

    pub fn database(&self) -> &str {
        &self.dbname
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }

    pub fn sslmode(&self) -> &str {
        self.sslmode.as_deref().unwrap_or(DEFAULT_SSLMODE)
    }

    /// `host:dbname`, safe for logs and error messages.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.host, self.dbname)
    }

    /// Driver URL, omitting the port and password when they are empty.
    pub fn connection_url(&self) -> String {
        let mut url = format!(
            "postgres://{}",
            utf8_percent_encode(&self.user, URL_COMPONENT)
        );
        if let Some(password) = self.password() {
            url.push(':');
            url.push_str(&utf8_percent_encode(password, URL_COMPONENT).to_string());
        }
        url.push('@');
        url.push_str(&self.host);
        if let Some(port) = self.port() {
            url.push(':');
            url.push_str(port);
        }
        url.push('/');
        url.push_str(&utf8_percent_encode(&self.dbname, URL_COMPONENT).to_string());
        url.push_str("?sslmode=");
        url.push_str(&utf8_percent_encode(self.sslmode(), URL_COMPONENT).to_string());
        url
    }
}

impl fmt::Display for ConnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.dbname)
    }
}

impl fmt::Debug for ConnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnDescriptor")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password().map(|_| "***"))
            .field("sslmode", &self.sslmode())
            .finish()
    }
}

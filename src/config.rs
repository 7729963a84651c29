//! Connection configuration.
//!
//! A configuration file maps logical database names to connection details and
//! carries the fetch tuning knobs shared by every database:
//!
//! ```toml
//! [databases.reporting]
//! kind = "postgres"
//! host = "replica.internal"
//! username = "reader"
//! password = "secret"
//! database = "reports"
//!
//! [databases.local]
//! kind = "sqlite"
//! database = "./dev.db"
//!
//! [fetch]
//! replicas = 3
//! statement_timeout_ms = 60000
//! fan_out_deadline_ms = 100
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use hedge_core::{DialectKind, HedgeError, Result};
use serde::Deserialize;

/// Connection details for one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    pub kind: DialectKind,
    #[serde(default)]
    pub host: String,
    /// `0` selects the dialect's default port.
    #[serde(default)]
    pub port: u16,
    #[serde(default, alias = "user")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Database name, or the file path for SQLite.
    #[serde(default)]
    pub database: String,
}

impl ConnectionConfig {
    pub fn new(kind: DialectKind, database: impl Into<String>) -> Self {
        Self {
            kind,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            database: database.into(),
        }
    }

    /// SQLite database at `path`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(DialectKind::Sqlite, path)
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Configured port, or the dialect default when none is set.
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.kind {
            DialectKind::MySql => 3306,
            DialectKind::SqlServer => 1433,
            DialectKind::Postgres => 5432,
            DialectKind::Sqlite => 0,
        }
    }

    /// Driver connection string in the dialect's native format.
    pub fn connection_string(&self) -> String {
        let port = self.effective_port();
        match self.kind {
            DialectKind::MySql => format!(
                "{}:{}@tcp({}:{})/{}",
                self.username, self.password, self.host, port, self.database
            ),
            DialectKind::SqlServer => format!(
                "server={};user id={};password={};port={};database={};",
                self.host, self.username, self.password, port, self.database
            ),
            DialectKind::Postgres => format!(
                "host={} port={} user={} password={} dbname={}",
                self.host, port, self.username, self.password, self.database
            ),
            DialectKind::Sqlite => self.database.clone(),
        }
    }
}

/// Tuning for the hedged and fan-out fetch paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Number of redundant executions raced by [`Database::race`](crate::Database::race).
    pub replicas: usize,
    /// Backend timeout applied to every statement.
    #[serde(rename = "statement_timeout_ms", with = "millis")]
    pub statement_timeout: Duration,
    /// Overall deadline for a fan-out.
    #[serde(rename = "fan_out_deadline_ms", with = "millis")]
    pub fan_out_deadline: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            replicas: 3,
            statement_timeout: Duration::from_secs(60),
            fan_out_deadline: Duration::from_millis(100),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Logical name to connection details, plus shared fetch options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Connections {
    #[serde(default)]
    databases: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    fetch: FetchOptions,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let connections: Self =
            toml::from_str(content).map_err(|e| HedgeError::Config(e.to_string()))?;
        connections.validate()?;
        Ok(connections)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HedgeError::Config(format!("config file not found: {}", path.display()))
            } else {
                HedgeError::Config(format!("failed to read {}: {e}", path.display()))
            }
        })?;
        let connections: Self = toml::from_str(&content)
            .map_err(|e| HedgeError::Config(format!("{}: {e}", path.display())))?;
        connections.validate()?;
        Ok(connections)
    }

    pub fn insert(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.databases.insert(name.into(), config);
        self
    }

    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn get(&self, name: &str) -> Result<&ConnectionConfig> {
        self.databases
            .get(name)
            .ok_or_else(|| HedgeError::UnknownDatabase(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    #[inline]
    pub fn fetch_options(&self) -> &FetchOptions {
        &self.fetch
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.replicas == 0 {
            return Err(HedgeError::Config("fetch.replicas must be at least 1".into()));
        }
        for (name, config) in &self.databases {
            if config.kind == DialectKind::Sqlite && config.database.is_empty() {
                return Err(HedgeError::Config(format!(
                    "database `{name}`: sqlite requires a file path in `database`"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        let mysql = ConnectionConfig::new(DialectKind::MySql, "app").with_host("db", 0);
        assert_eq!(mysql.effective_port(), 3306);
        let pg = ConnectionConfig::new(DialectKind::Postgres, "app").with_host("db", 6543);
        assert_eq!(pg.effective_port(), 6543);
    }

    #[test]
    fn connection_strings() {
        let base = |kind| {
            ConnectionConfig::new(kind, "app")
                .with_host("db", 0)
                .with_credentials("u", "p")
        };
        assert_eq!(
            base(DialectKind::MySql).connection_string(),
            "u:p@tcp(db:3306)/app"
        );
        assert_eq!(
            base(DialectKind::SqlServer).connection_string(),
            "server=db;user id=u;password=p;port=1433;database=app;"
        );
        assert_eq!(
            base(DialectKind::Postgres).connection_string(),
            "host=db port=5432 user=u password=p dbname=app"
        );
        assert_eq!(ConnectionConfig::sqlite("./dev.db").connection_string(), "./dev.db");
    }
}

//! Connection configuration.
//!
//! A [`DatabaseConfig`] describes how to reach one logical database. It
//! implements [`ChannelFactory`], so it is handed directly to
//! [`Orm::open`](quarry_db::orm::Orm::open): the registry uses it to open
//! the canonical connection and one dialect-identical clone per worker
//! thread.

use std::collections::HashMap;

use quarry_core::{QuarryError, QuarryResult};
use quarry_db::channel::{ChannelFactory, ExecutionChannel};
use quarry_db::dialect::Dialect;

use crate::sqlite::SqliteChannel;

/// Parameters for connecting to a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// The target dialect.
    pub dialect: Dialect,
    /// The database name or file path.
    pub name: String,
    /// The database host (network backends).
    pub host: Option<String>,
    /// The database port.
    pub port: Option<u16>,
    /// The database user.
    pub user: Option<String>,
    /// The database password.
    pub password: Option<String>,
    /// Additional connection options.
    pub options: HashMap<String, String>,
}

impl DatabaseConfig {
    /// Configuration for an in-memory SQLite database.
    ///
    /// Note that every channel opened from this configuration is its own
    /// private database; use a file for state shared across threads.
    pub fn sqlite_memory() -> Self {
        Self::sqlite_file(":memory:")
    }

    /// Configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            name: path.into(),
            host: None,
            port: None,
            user: None,
            password: None,
            options: HashMap::new(),
        }
    }

    /// Configuration for a PostgreSQL database. No driver ships in this
    /// crate; pair it with a custom [`ChannelFactory`].
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            dialect: Dialect::Postgres,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
            options: HashMap::new(),
        }
    }

    /// Configuration for a MySQL database. No driver ships in this crate;
    /// pair it with a custom [`ChannelFactory`].
    pub fn mysql(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            dialect: Dialect::MySql,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
            options: HashMap::new(),
        }
    }
}

impl ChannelFactory for DatabaseConfig {
    fn open(&self) -> QuarryResult<Box<dyn ExecutionChannel>> {
        match self.dialect {
            Dialect::Sqlite => Ok(Box::new(SqliteChannel::open(self.name.clone())?)),
            other => Err(QuarryError::Configuration(format!(
                "no built-in driver for {other:?}; supply a custom ChannelFactory"
            ))),
        }
    }
}

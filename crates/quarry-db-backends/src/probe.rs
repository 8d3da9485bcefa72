//! Dialect detection.
//!
//! Driver-backed channels know their dialect; generic (ODBC-style)
//! channels do not. [`dialect_for_driver`] inspects a driver name, and
//! [`probe_dialect`] falls back to a sequence of version queries that each
//! engine family answers differently.

use quarry_db::channel::ExecutionChannel;
use quarry_db::dialect::Dialect;
use quarry_db::value::Value;

/// Maps a driver name to a dialect, when the name is conclusive.
pub fn dialect_for_driver(name: &str) -> Option<Dialect> {
    let name = name.to_ascii_lowercase();
    if name.contains("mysql") {
        Some(Dialect::MySql)
    } else if name.contains("sqlite") {
        Some(Dialect::Sqlite)
    } else if name.contains("psql") || name.contains("postgres") {
        Some(Dialect::Postgres)
    } else {
        None
    }
}

fn first_string(channel: &mut dyn ExecutionChannel, sql: &str) -> Option<String> {
    let rows = channel.query(sql, &[]).ok()?;
    let row = rows.first()?;
    match row.values().first() {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Identifies the dialect of a live connection by probing.
///
/// The sequence: `SELECT sqlite_version()` succeeds only on SQLite;
/// `SELECT @@version` mentions "Microsoft SQL Server" there; `SELECT
/// version()` distinguishes PostgreSQL from MySQL. Anything else is
/// [`Dialect::Unknown`].
pub fn probe_dialect(channel: &mut dyn ExecutionChannel) -> Dialect {
    if channel.query("SELECT sqlite_version()", &[]).is_ok() {
        return Dialect::Sqlite;
    }
    if let Some(version) = first_string(channel, "SELECT @@version") {
        if version.contains("Microsoft SQL Server") {
            return Dialect::Mssql;
        }
    }
    if let Some(version) = first_string(channel, "SELECT version()") {
        if version.contains("PostgreSQL") {
            return Dialect::Postgres;
        }
        return Dialect::MySql;
    }
    Dialect::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteChannel;

    #[test]
    fn test_dialect_for_driver() {
        assert_eq!(dialect_for_driver("QMYSQL"), Some(Dialect::MySql));
        assert_eq!(dialect_for_driver("sqlite3"), Some(Dialect::Sqlite));
        assert_eq!(dialect_for_driver("QPSQL"), Some(Dialect::Postgres));
        assert_eq!(dialect_for_driver("postgresql"), Some(Dialect::Postgres));
        assert_eq!(dialect_for_driver("QODBC"), None);
    }

    #[test]
    fn test_probe_identifies_sqlite() {
        let mut channel = SqliteChannel::memory().unwrap();
        assert_eq!(probe_dialect(&mut channel), Dialect::Sqlite);
    }
}

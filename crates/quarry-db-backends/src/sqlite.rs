//! SQLite execution channel using `rusqlite`.
//!
//! Features:
//! - in-memory database support via the `:memory:` path (great for testing)
//! - `PRAGMA foreign_keys=ON` so referential actions are enforced
//! - WAL journal mode plus a busy timeout for file-backed databases, so
//!   per-thread connection clones can write concurrently

use std::path::PathBuf;
use std::time::Duration;

use quarry_core::{QuarryError, QuarryResult};
use quarry_db::channel::{ExecutionChannel, Row};
use quarry_db::dialect::Dialect;
use quarry_db::value::Value;

/// A synchronous SQLite channel. One channel wraps one connection; the
/// connection registry opens a separate channel per worker thread.
pub struct SqliteChannel {
    path: PathBuf,
    conn: rusqlite::Connection,
}

fn db_err(e: &rusqlite::Error) -> QuarryError {
    QuarryError::Database(e.to_string())
}

impl SqliteChannel {
    /// Opens a SQLite database at the given path (`:memory:` for an
    /// in-memory database).
    pub fn open(path: impl Into<PathBuf>) -> QuarryResult<Self> {
        let path = path.into();
        let memory = path.to_str() == Some(":memory:");
        let conn = if memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| QuarryError::Operational(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| QuarryError::Operational(format!("failed to set pragmas: {e}")))?;
        if !memory {
            // WAL lets one writer make progress while clones hold readers;
            // the busy timeout covers writer-writer contention.
            conn.busy_timeout(Duration::from_millis(5000))
                .map_err(|e| QuarryError::Operational(format!("failed to set busy timeout: {e}")))?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .map_err(|e| QuarryError::Operational(format!("failed to set pragmas: {e}")))?;
        }

        Ok(Self { path, conn })
    }

    /// Opens an in-memory database.
    pub fn memory() -> QuarryResult<Self> {
        Self::open(":memory:")
    }

    /// The database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Binds ORM values to a prepared statement, 1-based.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> QuarryResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string().as_str()),
                Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string().as_str()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string().as_str()),
                Value::List(vals) => {
                    let joined = vals
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    stmt.raw_bind_parameter(idx, joined.as_str())
                }
            }
            .map_err(|e| QuarryError::Database(format!("bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite` row into the engine's generic [`Row`].
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let value_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match value_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();
        Row::new(column_names.to_vec(), values)
    }
}

impl ExecutionChannel for SqliteChannel {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> QuarryResult<u64> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| db_err(&e))?;
        Self::bind_params(&mut stmt, params)?;
        let count = stmt.raw_execute().map_err(|e| db_err(&e))?;
        Ok(count as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| db_err(&e))?;
        let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        Self::bind_params(&mut stmt, params)?;

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(|e| db_err(&e))? {
            rows.push(Self::convert_row(row, &column_names));
        }
        Ok(rows)
    }

    fn last_insert_id(&mut self) -> QuarryResult<Value> {
        Ok(Value::Int(self.conn.last_insert_rowid()))
    }

    fn table_names(&mut self) -> QuarryResult<Vec<String>> {
        let rows = self.query(
            "SELECT name FROM sqlite_master WHERE type = 'table'",
            &[],
        )?;
        rows.iter().map(|row| row.get::<String>("name")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_open() {
        let channel = SqliteChannel::memory().unwrap();
        assert_eq!(channel.dialect(), Dialect::Sqlite);
        assert_eq!(channel.path().to_str(), Some(":memory:"));
    }

    #[test]
    fn test_execute_and_query() {
        let mut channel = SqliteChannel::memory().unwrap();
        channel
            .execute("CREATE TABLE t (id integer PRIMARY KEY, name text)", &[])
            .unwrap();
        let affected = channel
            .execute(
                "INSERT INTO t (name) VALUES(?)",
                &[Value::String("Ada".to_string())],
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(channel.last_insert_id().unwrap(), Value::Int(1));

        let rows = channel.query("SELECT id, name FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<i64>("id").unwrap(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Ada");
    }

    #[test]
    fn test_bind_value_kinds() {
        let mut channel = SqliteChannel::memory().unwrap();
        channel
            .execute(
                "CREATE TABLE t (b bool, i integer, f real, s text, d blob, n text)",
                &[],
            )
            .unwrap();
        channel
            .execute(
                "INSERT INTO t VALUES(?, ?, ?, ?, ?, ?)",
                &[
                    Value::Bool(true),
                    Value::Int(7),
                    Value::Float(0.5),
                    Value::String("x".to_string()),
                    Value::Bytes(vec![1, 2]),
                    Value::Null,
                ],
            )
            .unwrap();
        let rows = channel.query("SELECT * FROM t", &[]).unwrap();
        let values = rows[0].values();
        assert_eq!(values[0], Value::Int(1));
        assert_eq!(values[1], Value::Int(7));
        assert_eq!(values[2], Value::Float(0.5));
        assert_eq!(values[3], Value::String("x".to_string()));
        assert_eq!(values[4], Value::Bytes(vec![1, 2]));
        assert_eq!(values[5], Value::Null);
    }

    #[test]
    fn test_table_names() {
        let mut channel = SqliteChannel::memory().unwrap();
        channel.execute("CREATE TABLE alpha (id integer)", &[]).unwrap();
        channel.execute("CREATE TABLE beta (id integer)", &[]).unwrap();
        let tables = channel.table_names().unwrap();
        assert!(tables.contains(&"alpha".to_string()));
        assert!(tables.contains(&"beta".to_string()));
    }

    #[test]
    fn test_engine_error_is_preserved() {
        let mut channel = SqliteChannel::memory().unwrap();
        let err = channel.query("SELECT * FROM missing", &[]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}

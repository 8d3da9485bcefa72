//! The execution-channel abstraction.
//!
//! [`ExecutionChannel`] is the bridge between the ORM engine and a concrete
//! SQL driver: it accepts a parameterized statement plus ordered bind values
//! and returns rows or an affected-row count. Implementations live in the
//! `quarry-db-backends` crate; the engine itself never touches a driver.
//!
//! All calls are synchronous and blocking. The engine serializes access to
//! each channel, so implementations do not need internal locking.

use quarry_core::{QuarryError, QuarryResult};

use crate::dialect::Dialect;
use crate::value::Value;

/// A single result row: ordered column names and their values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the cell values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> QuarryResult<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| QuarryError::UnknownField(format!("column '{column}' not in row")))?;
        T::from_value(&self.values[idx])
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> QuarryResult<T> {
        if idx >= self.values.len() {
            return Err(QuarryError::Database(format!(
                "column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            )));
        }
        T::from_value(&self.values[idx])
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> QuarryResult<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(QuarryError::Database(format!("expected Int, got {value:?}"))),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Int(i) => Self::try_from(*i)
                .map_err(|e| QuarryError::Database(format!("Int out of i32 range: {e}"))),
            _ => Err(QuarryError::Database(format!("expected Int, got {value:?}"))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(*i as Self),
            _ => Err(QuarryError::Database(format!(
                "expected Float, got {value:?}"
            ))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            // Engines without a native boolean hand back 0/1.
            Value::Int(i) => Ok(*i != 0),
            _ => Err(QuarryError::Database(format!(
                "expected Bool, got {value:?}"
            ))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(QuarryError::Database(format!(
                "expected String, got {value:?}"
            ))),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> QuarryResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

/// A live connection to a database engine.
///
/// A channel is used by one thread at a time (the connection registry
/// enforces this), so methods take `&mut self` and implementations can hold
/// driver state directly.
pub trait ExecutionChannel: Send {
    /// Returns the dialect this channel speaks.
    fn dialect(&self) -> Dialect;

    /// Runs a statement that does not return rows; returns the number of
    /// affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> QuarryResult<u64>;

    /// Runs a query and returns all result rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> QuarryResult<Vec<Row>>;

    /// Returns the key generated by the most recent INSERT on this
    /// connection, where the engine supports it.
    fn last_insert_id(&mut self) -> QuarryResult<Value>;

    /// Lists the tables present in the connected schema.
    fn table_names(&mut self) -> QuarryResult<Vec<String>>;
}

/// Opens dialect-identical channels against one database configuration.
///
/// The connection registry uses the factory to create the canonical
/// connection at setup and one clone per additional worker thread.
pub trait ChannelFactory: Send + Sync {
    /// Opens a new channel.
    fn open(&self) -> QuarryResult<Box<dyn ExecutionChannel>>;
}

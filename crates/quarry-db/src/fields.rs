//! Field metadata for the ORM.
//!
//! [`FieldDef`] captures everything the engine knows about a single column:
//! its semantic [`FieldType`], constraints, and (for foreign keys) the target
//! model and [`OnDelete`] policy. Definitions are normally produced by
//! [`ModelDescriptor`](crate::descriptor::ModelDescriptor) construction from
//! a declarative spec, but can also be built directly.

use crate::value::Value;

/// The semantic type of a model field, mapped per dialect to a concrete
/// column type by [`Dialect::column_type`](crate::dialect::Dialect::column_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldType {
    /// Boolean (true/false).
    Bool,
    /// 32-bit-class integer (stored as `integer`).
    Int,
    /// 64-bit integer (stored as `bigint`).
    Long,
    /// 64-bit floating-point number.
    Double,
    /// Text, sized by `max_length` when given.
    Text,
    /// Date without time.
    Date,
    /// Time without date.
    Time,
    /// Date and time.
    DateTime,
    /// Raw binary data.
    Bytes,
    /// A list of strings, stored comma-joined in a text column.
    TextList,
}

/// Behavior when a referenced row is deleted (the `ON DELETE` action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// No referential action clause is emitted.
    #[default]
    NoAction,
    /// Prevent deletion while referencing rows exist.
    Restrict,
    /// Delete referencing rows along with the referenced one.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
}

/// Complete definition of a single model field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// The model-level field name.
    pub name: String,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The semantic type of this field.
    pub field_type: FieldType,
    /// Maximum character/byte length for text and binary columns.
    pub max_length: usize,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Whether the field may be left blank.
    pub blank: bool,
    /// Whether the column auto-increments.
    pub auto_increment: bool,
    /// Whether a database index should be created.
    pub db_index: bool,
    /// Class name of the referenced model, for foreign-key fields.
    pub foreign_model: Option<String>,
    /// Referential action for foreign-key fields.
    pub on_delete: OnDelete,
}

impl FieldDef {
    /// Creates a new `FieldDef` with defaults: non-null, no constraints,
    /// column name equal to the field name.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            max_length: 0,
            null: false,
            unique: false,
            blank: false,
            auto_increment: false,
            db_index: false,
            foreign_model: None,
            on_delete: OnDelete::NoAction,
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this field as having a database index.
    #[must_use]
    pub fn db_index(mut self) -> Self {
        self.db_index = true;
        self
    }

    /// Marks this column as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Returns `true` if this field stores a foreign key.
    pub const fn is_relation(&self) -> bool {
        self.foreign_model.is_some()
    }

    /// Transforms an in-memory value into its stored form.
    ///
    /// - an absent value on a non-nullable text field becomes an empty
    ///   string, never NULL;
    /// - a null or zero value on a nullable foreign-key column maps to SQL
    ///   NULL (0 is not a valid key);
    /// - a string list is serialized to one comma-joined string.
    pub fn to_database(&self, value: Value) -> Value {
        if self.field_type == FieldType::Text && !self.null && value.is_null() {
            Value::String(String::new())
        } else if self.foreign_model.is_some()
            && self.null
            && (value.is_null() || value.as_int() == Some(0))
        {
            Value::Null
        } else if self.field_type == FieldType::TextList {
            Value::String(value.as_string_list().join(","))
        } else {
            value
        }
    }

    /// Undoes the [`to_database`](Self::to_database) transform for values
    /// read back from a row. Only string lists need the inverse split; an
    /// empty stored string loads as an empty list.
    pub fn from_database(&self, value: Value) -> Value {
        if self.field_type == FieldType::TextList {
            match value {
                Value::String(s) if s.is_empty() => Value::List(Vec::new()),
                Value::String(s) => {
                    Value::List(s.split(',').map(|p| Value::String(p.to_string())).collect())
                }
                other => other,
            }
        } else {
            value
        }
    }
}

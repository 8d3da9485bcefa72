//! The model trait and declarative model specs.
//!
//! [`ModelSpec`] is the statically-typed stand-in for a reflection system: it
//! lists a model's class name, an optional model-level annotation string, and
//! the declared properties in order, each with a name, a [`DeclaredType`] and
//! an annotation string of space-separated `key=value` options. A
//! [`ModelDescriptor`](crate::descriptor::ModelDescriptor) is derived from it
//! once at registration time.
//!
//! The [`Model`] trait is what user types implement so queryset results can
//! be materialized onto them and instances can be saved back. Field access is
//! dynamic (by field name) so one descriptor-driven engine serves every model.
//!
//! # Examples
//!
//! ```
//! use quarry_db::model::{Model, ModelSpec};
//! use quarry_db::fields::FieldType;
//! use quarry_db::value::Value;
//!
//! #[derive(Default)]
//! struct Book {
//!     id: i64,
//!     title: String,
//! }
//!
//! impl Model for Book {
//!     fn spec() -> ModelSpec {
//!         ModelSpec::new("Book")
//!             .property("title", FieldType::Text, "max_length=255")
//!     }
//!
//!     fn get(&self, field: &str) -> Option<Value> {
//!         match field {
//!             "id" => Some(Value::Int(self.id)),
//!             "title" => Some(Value::String(self.title.clone())),
//!             _ => None,
//!         }
//!     }
//!
//!     fn set(&mut self, field: &str, value: Value) {
//!         match field {
//!             "id" => self.id = value.as_int().unwrap_or(0),
//!             "title" => self.title = value.as_str().unwrap_or("").to_string(),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use crate::fields::FieldType;
use crate::value::Value;

/// The declared type of a model property: either a scalar field type or the
/// class name of another model, which makes the property a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    /// A plain column of the given semantic type.
    Scalar(FieldType),
    /// A reference to another model; stored as an integer `<name>_id` column.
    Model(String),
}

/// One declared property: name, declared type, and its annotation string.
///
/// Recognized options are `db_column`, `db_index`, `max_length`, `null`,
/// `primary_key`, `auto_increment`, `unique`, `blank`, `ignore_field` and
/// `on_delete` (`cascade` / `set_null` / `restrict`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// The property name.
    pub name: String,
    /// The declared type.
    pub declared: DeclaredType,
    /// Space-separated `key=value` annotation tokens.
    pub options: String,
}

/// The declarative description of one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// The model class name; also the default table name, lowercased.
    pub class_name: String,
    /// Optional model-level annotation (`db_table=...`, `unique_together=a,b`).
    pub meta: Option<String>,
    /// Declared properties, in order.
    pub properties: Vec<PropertySpec>,
}

impl ModelSpec {
    /// Creates an empty spec for the given class name.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            meta: None,
            properties: Vec::new(),
        }
    }

    /// Sets the model-level annotation string.
    #[must_use]
    pub fn meta(mut self, options: impl Into<String>) -> Self {
        self.meta = Some(options.into());
        self
    }

    /// Appends a scalar property.
    #[must_use]
    pub fn property(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        options: impl Into<String>,
    ) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            declared: DeclaredType::Scalar(field_type),
            options: options.into(),
        });
        self
    }

    /// Appends a foreign-key property referencing another model.
    #[must_use]
    pub fn foreign(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: impl Into<String>,
    ) -> Self {
        self.properties.push(PropertySpec {
            name: name.into(),
            declared: DeclaredType::Model(target.into()),
            options: options.into(),
        });
        self
    }
}

/// The trait implemented by user model types.
///
/// Static methods carry the declarative spec; the dynamic `get`/`set`
/// surface lets the engine read and write fields by name when saving
/// instances and loading rows. `related_mut` exposes an embedded related
/// instance so select-related rows can be materialized recursively; models
/// without embedded relations keep the default.
pub trait Model {
    /// Returns the declarative spec this model registers under.
    fn spec() -> ModelSpec
    where
        Self: Sized;

    /// Returns the class name used for registry lookups.
    fn class_name() -> String
    where
        Self: Sized,
    {
        Self::spec().class_name
    }

    /// Reads a field value by name; `None` for unknown fields.
    fn get(&self, field: &str) -> Option<Value>;

    /// Writes a field value by name; unknown fields are ignored.
    fn set(&mut self, field: &str, value: Value);

    /// Returns the embedded instance behind a foreign-key property, if the
    /// model carries one.
    fn related_mut(&mut self, _field: &str) -> Option<&mut dyn Model> {
        None
    }
}

//! Model descriptors: reflected schema metadata for one model type.
//!
//! A [`ModelDescriptor`] is derived once from a [`ModelSpec`] at
//! registration time and shared (reference-counted) by every queryset for
//! that type. It answers the structural questions the rest of the engine
//! asks: field list, column names, primary key, foreign-key targets, and
//! the value transforms applied when writing to and reading from the
//! database.

use std::collections::BTreeMap;

use quarry_core::{QuarryError, QuarryResult};

use crate::fields::{FieldDef, FieldType, OnDelete};
use crate::filter::{Filter, Op};
use crate::model::{DeclaredType, Model, ModelSpec};
use crate::orm::Orm;
use crate::queryset::QueryState;
use crate::registry::ModelRegistry;
use crate::value::Value;

/// Parses a space-separated `key=value` annotation string.
///
/// Keys are lowercased; tokens without a `=` are reported and skipped.
pub(crate) fn parse_options(value: &str) -> Vec<(String, String)> {
    let mut options = Vec::new();
    for item in value.split_whitespace() {
        if let Some((key, val)) = item.split_once('=') {
            options.push((key.to_lowercase(), val.to_string()));
        } else {
            tracing::warn!(target: "quarry_db", token = item, "could not parse option");
        }
    }
    options
}

fn string_to_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Reflected schema metadata for one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    class_name: String,
    table: String,
    local_fields: Vec<FieldDef>,
    foreign_fields: BTreeMap<String, String>,
    primary_key: String,
    unique_together: Vec<String>,
}

impl ModelDescriptor {
    /// Builds a descriptor from a declarative spec.
    ///
    /// The table name defaults to the lowercased class name; the model-level
    /// annotation can override it (`db_table=...`) and declare a composite
    /// uniqueness constraint (`unique_together=a,b`). A property whose
    /// declared type names another model becomes an indexed integer
    /// `<name>_id` foreign-key field. If no property is marked
    /// `primary_key`, an implicit auto-increment integer `id` field is
    /// prepended and becomes the primary key.
    pub fn from_spec(spec: &ModelSpec) -> Self {
        let class_name = spec.class_name.clone();
        let mut table = class_name.to_lowercase();
        let mut unique_together: Vec<String> = Vec::new();

        if let Some(meta) = &spec.meta {
            for (key, value) in parse_options(meta) {
                if key == "db_table" {
                    table = value;
                } else if key == "unique_together" {
                    unique_together = value.split(',').map(str::to_string).collect();
                }
            }
        }

        let mut local_fields: Vec<FieldDef> = Vec::new();
        let mut foreign_fields: BTreeMap<String, String> = BTreeMap::new();
        let mut primary_key = String::new();

        for prop in &spec.properties {
            // The primary-key alias is reserved, never a declared column.
            if prop.name == "pk" {
                continue;
            }

            let mut auto_increment = false;
            let mut db_column: Option<String> = None;
            let mut db_index = false;
            let mut ignore_field = false;
            let mut max_length = 0usize;
            let mut primary = false;
            let mut null = false;
            let mut unique = false;
            let mut blank = false;
            let mut on_delete = OnDelete::NoAction;

            for (key, value) in parse_options(&prop.options) {
                match key.as_str() {
                    "auto_increment" => auto_increment = string_to_bool(&value),
                    "db_column" => db_column = Some(value),
                    "db_index" => db_index = string_to_bool(&value),
                    "ignore_field" => ignore_field = string_to_bool(&value),
                    "max_length" => max_length = value.parse().unwrap_or(0),
                    "null" => null = string_to_bool(&value),
                    "primary_key" => primary = string_to_bool(&value),
                    "unique" => unique = string_to_bool(&value),
                    "blank" => blank = string_to_bool(&value),
                    "on_delete" => {
                        on_delete = match value.to_lowercase().as_str() {
                            "cascade" => OnDelete::Cascade,
                            "set_null" => OnDelete::SetNull,
                            "restrict" => OnDelete::Restrict,
                            _ => OnDelete::NoAction,
                        };
                    }
                    _ => {}
                }
            }

            if ignore_field {
                continue;
            }

            match &prop.declared {
                DeclaredType::Model(target) => {
                    foreign_fields.insert(prop.name.clone(), target.clone());

                    let name = format!("{}_id", prop.name);
                    let column = db_column.unwrap_or_else(|| name.clone());
                    let mut field = FieldDef::new(name, FieldType::Int).column(column);
                    field.db_index = true;
                    field.null = null;
                    field.foreign_model = Some(target.clone());
                    field.on_delete = on_delete;
                    local_fields.push(field);
                }
                DeclaredType::Scalar(field_type) => {
                    let mut field = FieldDef::new(prop.name.clone(), *field_type);
                    if let Some(column) = db_column {
                        field.column = column;
                    }
                    field.max_length = max_length;
                    field.null = null;
                    if primary {
                        field.auto_increment = auto_increment;
                        primary_key = field.name.clone();
                    } else if unique {
                        field.unique = true;
                    } else if blank {
                        field.blank = true;
                    } else if db_index {
                        field.db_index = true;
                    }
                    local_fields.push(field);
                }
            }
        }

        if primary_key.is_empty() {
            let field = FieldDef::new("id", FieldType::Int).auto_increment();
            primary_key = field.name.clone();
            local_fields.insert(0, field);
        }

        Self {
            class_name,
            table,
            local_fields,
            foreign_fields,
            primary_key,
            unique_together,
        }
    }

    /// The model class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The database table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The name of the primary-key field.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// All local fields, in declaration order.
    pub fn local_fields(&self) -> &[FieldDef] {
        &self.local_fields
    }

    /// Mapping from foreign-key property name to target model class name.
    pub fn foreign_fields(&self) -> &BTreeMap<String, String> {
        &self.foreign_fields
    }

    /// Field names forming a composite uniqueness constraint, if any.
    pub fn unique_together(&self) -> &[String] {
        &self.unique_together
    }

    /// Returns the local field with the given name. The literal name `"pk"`
    /// resolves to the primary-key field.
    pub fn local_field(&self, name: &str) -> QuarryResult<&FieldDef> {
        let wanted = if name == "pk" {
            self.primary_key.as_str()
        } else {
            name
        };
        self.local_fields
            .iter()
            .find(|f| f.name == wanted)
            .ok_or_else(|| QuarryError::UnknownField(format!("{}.{name}", self.class_name)))
    }

    /// Materializes one cached row onto a model instance, advancing `pos`
    /// past every consumed column.
    ///
    /// Local fields are set first, in declaration order; when the row also
    /// carries related columns, foreign-key targets are loaded recursively.
    /// `related` follows the select-related selection: `None` loads every
    /// foreign key, `Some(paths)` only those named (with `a__b` narrowing
    /// the next level). A foreign key whose embedded instance is absent has
    /// its columns skipped so the cursor stays aligned.
    pub fn load(
        &self,
        registry: &ModelRegistry,
        instance: &mut dyn Model,
        row: &[Value],
        pos: &mut usize,
        related: Option<&[String]>,
    ) -> QuarryResult<()> {
        for field in &self.local_fields {
            let value = row.get(*pos).cloned().ok_or_else(|| {
                QuarryError::Database(format!(
                    "row too short while loading {} (wanted column {})",
                    self.class_name, *pos
                ))
            })?;
            *pos += 1;
            instance.set(&field.name, field.from_database(value));
        }

        if *pos >= row.len() {
            return Ok(());
        }

        for (fk_name, target) in &self.foreign_fields {
            let branch = narrow_related(related, fk_name);
            let Some(sub_related) = branch else { continue };
            let foreign = registry.descriptor(target)?;
            if let Some(object) = instance.related_mut(fk_name) {
                foreign.load(registry, object, row, pos, sub_related.as_deref())?;
            } else {
                *pos += foreign.selection_width(registry, sub_related.as_deref())?;
            }
        }
        Ok(())
    }

    /// Number of columns a SELECT contributes for this model under the
    /// given related selection; mirrors the path compiler's column
    /// enumeration.
    pub(crate) fn selection_width(
        &self,
        registry: &ModelRegistry,
        related: Option<&[String]>,
    ) -> QuarryResult<usize> {
        let mut width = self.local_fields.len();
        for (fk_name, target) in &self.foreign_fields {
            if let Some(sub_related) = narrow_related(related, fk_name) {
                let foreign = registry.descriptor(target)?;
                width += foreign.selection_width(registry, sub_related.as_deref())?;
            }
        }
        Ok(width)
    }

    /// Saves an instance: UPDATE when a row with its primary key already
    /// exists, INSERT otherwise.
    ///
    /// A null (or integer zero) primary key always inserts. For
    /// auto-increment primary keys the generated key is fetched back from
    /// the channel and written onto the instance.
    pub fn save(&self, orm: &Orm, instance: &mut dyn Model) -> QuarryResult<()> {
        let pk_field = self.local_field("pk")?.clone();
        let pk_value = instance.get(&self.primary_key).unwrap_or(Value::Null);
        let int_zero = matches!(pk_field.field_type, FieldType::Int | FieldType::Long)
            && pk_value.as_int() == Some(0);

        if !pk_value.is_null() && !int_zero {
            let dialect = orm.dialect();
            let sql = format!(
                "SELECT 1 AS a FROM {} WHERE {} = ?",
                dialect.quote_ident(&self.table),
                dialect.quote_ident(&pk_field.column)
            );
            let rows = orm.run_query(&sql, &[pk_value.clone()])?;
            if !rows.is_empty() {
                let mut fields = BTreeMap::new();
                for field in &self.local_fields {
                    if field.name != self.primary_key {
                        let value = instance.get(&field.name).unwrap_or(Value::Null);
                        fields.insert(field.name.clone(), field.to_database(value));
                    }
                }
                let mut qs = QueryState::new(orm.clone(), self.class_name.clone());
                qs.add_filter(Filter::new("pk", Op::Equals, pk_value));
                qs.sql_update(&fields)?;
                return Ok(());
            }
        }

        let mut fields = BTreeMap::new();
        for field in &self.local_fields {
            if !field.auto_increment {
                let value = instance.get(&field.name).unwrap_or(Value::Null);
                fields.insert(field.name.clone(), field.to_database(value));
            }
        }

        let mut qs = QueryState::new(orm.clone(), self.class_name.clone());
        if pk_field.auto_increment {
            if let Some(id) = qs.sql_insert(&fields, true)? {
                instance.set(&self.primary_key, id);
            }
        } else {
            qs.sql_insert(&fields, false)?;
        }
        Ok(())
    }

    /// Returns the related instance behind the foreign-key property
    /// `name`, fetching it by primary key when the embedded copy does not
    /// match the stored key.
    pub fn foreign_key<'a>(
        &self,
        orm: &Orm,
        instance: &'a mut dyn Model,
        name: &str,
    ) -> QuarryResult<&'a mut dyn Model> {
        let target = self
            .foreign_fields
            .get(name)
            .ok_or_else(|| QuarryError::UnknownField(format!("{}.{name}", self.class_name)))?
            .clone();
        let foreign = orm.descriptor(&target)?;
        let fk_value = instance.get(&format!("{name}_id")).unwrap_or(Value::Null);
        let object = instance.related_mut(name).ok_or_else(|| {
            QuarryError::UnknownField(format!(
                "{} carries no embedded instance for '{name}'",
                self.class_name
            ))
        })?;

        let current = object.get(foreign.primary_key()).unwrap_or(Value::Null);
        if current != fk_value {
            let mut qs = QueryState::new(orm.clone(), target);
            qs.add_filter(Filter::new("pk", Op::Equals, fk_value));
            qs.sql_fetch()?;
            if qs.cached_len() != 1 {
                return Err(QuarryError::NotFound(format!(
                    "{} row referenced by {}.{name} does not exist",
                    foreign.class_name(),
                    self.class_name
                )));
            }
            qs.sql_load(object, 0)?;
        }
        Ok(object)
    }

    /// Points the foreign-key property `name` at `value`, copying the
    /// target's primary key into the stored `<name>_id` field (NULL when
    /// `value` is absent).
    pub fn set_foreign_key(
        &self,
        registry: &ModelRegistry,
        instance: &mut dyn Model,
        name: &str,
        value: Option<&dyn Model>,
    ) -> QuarryResult<()> {
        let target = self
            .foreign_fields
            .get(name)
            .ok_or_else(|| QuarryError::UnknownField(format!("{}.{name}", self.class_name)))?;
        let foreign = registry.descriptor(target)?;
        let key = match value {
            Some(object) => object.get(foreign.primary_key()).unwrap_or(Value::Null),
            None => Value::Null,
        };
        instance.set(&format!("{name}_id"), key);
        Ok(())
    }

    /// Deletes the row matching the instance's primary key.
    pub fn remove(&self, orm: &Orm, instance: &dyn Model) -> QuarryResult<()> {
        let pk_value = instance.get(&self.primary_key).unwrap_or(Value::Null);
        let mut qs = QueryState::new(orm.clone(), self.class_name.clone());
        qs.add_filter(Filter::new("pk", Op::Equals, pk_value));
        qs.sql_delete()?;
        Ok(())
    }
}

/// Applies the select-related narrowing rules for one foreign key:
/// `None` (load everything) stays `None` one level down; an explicit list
/// loads the key only when named, narrowed to the entries below it.
pub(crate) fn narrow_related(
    related: Option<&[String]>,
    fk_name: &str,
) -> Option<Option<Vec<String>>> {
    match related {
        None => Some(None),
        Some(list) if list.iter().any(|r| r == fk_name) => {
            let prefix = format!("{fk_name}__");
            let narrowed: Vec<String> = list
                .iter()
                .filter_map(|r| r.strip_prefix(&prefix).map(String::from))
                .collect();
            Some(Some(narrowed))
        }
        Some(_) => None,
    }
}

//! The relational-path-to-join compiler.
//!
//! A [`Compiler`] resolves traversal field paths of the form `a__b__c`
//! (foreign key `a`, then `b` on its target model, then field `c`) into
//! qualified `alias.column` references, accumulating the JOIN graph needed
//! to reach them. Aliases are assigned `T0`, `T1`, ... in resolution order;
//! the base table stands in for the empty path.
//!
//! A path segment that does not name a forward foreign key is attempted as
//! a *reverse* relation: the segment must name a model whose own foreign
//! keys include one targeting the base model, and the join is synthesized
//! from that foreign key's column to the base model's primary key. Anything
//! else is an error, never a silent fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{QuarryError, QuarryResult};

use crate::descriptor::{narrow_related, ModelDescriptor};
use crate::dialect::{Dialect, Pagination};
use crate::filter::Filter;
use crate::registry::ModelRegistry;

#[derive(Debug, Clone)]
struct ModelRef {
    alias: String,
    table: String,
    nullable: bool,
}

#[derive(Debug, Clone)]
struct ReverseRef {
    left_column: String,
    right_field: String,
}

/// Resolves field paths against one base model and collects joins.
pub struct Compiler<'a> {
    registry: &'a ModelRegistry,
    dialect: Dialect,
    base: Arc<ModelDescriptor>,
    model_refs: BTreeMap<String, ModelRef>,
    reverse_refs: BTreeMap<String, ReverseRef>,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler for the given base model.
    pub fn new(
        model_name: &str,
        registry: &'a ModelRegistry,
        dialect: Dialect,
    ) -> QuarryResult<Self> {
        Ok(Self {
            registry,
            dialect,
            base: registry.descriptor(model_name)?,
            model_refs: BTreeMap::new(),
            reverse_refs: BTreeMap::new(),
        })
    }

    /// Returns the table reference for a traversal path, assigning a fresh
    /// alias on first sight. The empty path is the (quoted) base table.
    fn reference_model(&mut self, model_path: &str, table: &str, nullable: bool) -> String {
        if model_path.is_empty() {
            return self.dialect.quote_ident(self.base.table());
        }
        if let Some(existing) = self.model_refs.get(model_path) {
            return existing.alias.clone();
        }
        let alias = format!("T{}", self.model_refs.len());
        self.model_refs.insert(
            model_path.to_string(),
            ModelRef {
                alias: alias.clone(),
                table: table.to_string(),
                nullable,
            },
        );
        alias
    }

    /// Resolves a field path into a qualified `reference.column` string.
    pub fn database_column(&mut self, name: &str) -> QuarryResult<String> {
        let mut model = self.base.clone();
        let mut model_path = String::new();
        let mut model_ref = self.reference_model("", "", false);

        let bits: Vec<&str> = name.split("__").collect();
        let mut idx = 0;
        while bits.len() - idx > 1 {
            let fk = bits[idx];
            if !model_path.is_empty() {
                model_path.push_str("__");
            }
            model_path.push_str(fk);

            let (foreign, nullable) = if let Some(target) = model.foreign_fields().get(fk).cloned()
            {
                let nullable = model.local_field(&format!("{fk}_id"))?.null;
                (self.registry.descriptor(&target)?, nullable)
            } else {
                // Not a forward key: the segment must name a model holding a
                // foreign key back onto the base model (reverse one-to-many).
                let foreign = self
                    .registry
                    .descriptor(fk)
                    .map_err(|_| QuarryError::InvalidFieldPath(name.to_string()))?;
                let mut left_column = None;
                for (fk_name, target) in foreign.foreign_fields() {
                    if target.as_str() == self.base.class_name() {
                        left_column =
                            Some(foreign.local_field(&format!("{fk_name}_id"))?.column.clone());
                        break;
                    }
                }
                let left_column =
                    left_column.ok_or_else(|| QuarryError::InvalidFieldPath(name.to_string()))?;
                self.reverse_refs.insert(
                    model_path.clone(),
                    ReverseRef {
                        left_column,
                        right_field: self.base.primary_key().to_string(),
                    },
                );
                (foreign, false)
            };

            model_ref = self.reference_model(&model_path, foreign.table(), nullable);
            model = foreign;
            idx += 1;
        }

        let field = model.local_field(bits[idx])?;
        Ok(format!(
            "{model_ref}.{}",
            self.dialect.quote_ident(&field.column)
        ))
    }

    /// Rewrites every leaf key of a filter into a qualified column.
    pub fn resolve(&mut self, filter: &mut Filter) -> QuarryResult<()> {
        filter.resolve_keys(&mut |key| self.database_column(key))
    }

    /// Enumerates the selectable columns for a SELECT.
    ///
    /// Without `recurse`, only the base model's own columns. With it, the
    /// columns of every foreign-key target are appended recursively under
    /// their own aliases; `fields` optionally restricts recursion to an
    /// allow-list of relation paths (`None` means all).
    pub fn field_names(
        &mut self,
        recurse: bool,
        fields: Option<&[String]>,
    ) -> QuarryResult<Vec<String>> {
        let base = self.base.clone();
        self.field_names_inner(recurse, fields, &base, "", false)
    }

    fn field_names_inner(
        &mut self,
        recurse: bool,
        fields: Option<&[String]>,
        descriptor: &Arc<ModelDescriptor>,
        model_path: &str,
        nullable: bool,
    ) -> QuarryResult<Vec<String>> {
        let table_ref = self.reference_model(model_path, descriptor.table(), nullable);
        let mut columns: Vec<String> = descriptor
            .local_fields()
            .iter()
            .map(|field| format!("{table_ref}.{}", self.dialect.quote_ident(&field.column)))
            .collect();
        if !recurse {
            return Ok(columns);
        }

        let path_prefix = if model_path.is_empty() {
            String::new()
        } else {
            format!("{model_path}__")
        };
        for (fk_name, target) in descriptor.foreign_fields().clone() {
            let Some(sub_fields) = narrow_related(fields, &fk_name) else {
                continue;
            };
            let foreign = self.registry.descriptor(&target)?;
            let nullable_foreign = descriptor.local_field(&format!("{fk_name}_id"))?.null;
            columns.extend(self.field_names_inner(
                recurse,
                sub_fields.as_deref(),
                &foreign,
                &format!("{path_prefix}{fk_name}"),
                nullable_foreign,
            )?);
        }
        Ok(columns)
    }

    /// Renders the FROM clause: the base table plus one JOIN per resolved
    /// alias. Nullable relations join LEFT OUTER, the rest INNER; reverse
    /// relations join on their synthesized foreign-key condition.
    pub fn from_sql(&mut self) -> QuarryResult<String> {
        let mut from = self.dialect.quote_ident(self.base.table());
        let paths: Vec<String> = self.model_refs.keys().cloned().collect();
        for path in paths {
            let (alias, table, nullable) = {
                let r = &self.model_refs[&path];
                (r.alias.clone(), r.table.clone(), r.nullable)
            };
            let (left, right) = if let Some(rev) = self.reverse_refs.get(&path).cloned() {
                (
                    format!("{alias}.{}", self.dialect.quote_ident(&rev.left_column)),
                    self.database_column(&rev.right_field)?,
                )
            } else {
                (
                    self.database_column(&format!("{path}__pk"))?,
                    self.database_column(&format!("{path}_id"))?,
                )
            };
            let join = if nullable {
                "LEFT OUTER JOIN"
            } else {
                "INNER JOIN"
            };
            from.push_str(&format!(
                " {join} {} {alias} ON {left} = {right}",
                self.dialect.quote_ident(&table)
            ));
        }
        Ok(from)
    }

    /// Renders the ORDER BY and pagination clauses.
    ///
    /// Each ordering key is resolved like any other path; a `-` prefix
    /// sorts descending (`+` is accepted and stripped). `low`/`high` are a
    /// 0-based offset and exclusive end; zero means unset.
    pub fn order_limit_sql(
        &mut self,
        order_by: &[String],
        low_mark: usize,
        high_mark: usize,
    ) -> QuarryResult<String> {
        let mut clause = String::new();

        let mut bits = Vec::new();
        for key in order_by {
            let (field, direction) = if let Some(rest) = key.strip_prefix('-') {
                (rest, "DESC")
            } else if let Some(rest) = key.strip_prefix('+') {
                (rest, "ASC")
            } else {
                (key.as_str(), "ASC")
            };
            bits.push(format!("{} {direction}", self.database_column(field)?));
        }
        if !bits.is_empty() {
            clause.push_str(&format!(" ORDER BY {}", bits.join(", ")));
        }

        match self.dialect.traits().pagination {
            Pagination::OffsetFetch => {
                // OFFSET/FETCH requires an ORDER BY; fall back to the
                // primary key when pagination is requested unordered.
                if clause.is_empty() && (low_mark > 0 || high_mark > 0) {
                    let pk = self.base.primary_key().to_string();
                    clause.push_str(&format!(" ORDER BY {}", self.database_column(&pk)?));
                }
                if low_mark > 0 || high_mark > 0 {
                    clause.push_str(&format!(" OFFSET {low_mark} ROWS"));
                }
                if high_mark > 0 {
                    clause.push_str(&format!(" FETCH NEXT {} ROWS ONLY", high_mark - low_mark));
                }
            }
            Pagination::LimitOffset { no_limit_sentinel } => {
                if high_mark > 0 {
                    clause.push_str(&format!(" LIMIT {}", high_mark - low_mark));
                }
                if low_mark > 0 {
                    if high_mark == 0 {
                        if let Some(sentinel) = no_limit_sentinel {
                            clause.push_str(&format!(" LIMIT {sentinel}"));
                        }
                    }
                    clause.push_str(&format!(" OFFSET {low_mark}"));
                }
            }
        }

        Ok(clause)
    }
}

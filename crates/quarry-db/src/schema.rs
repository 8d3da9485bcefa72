//! Schema generation: CREATE/DROP TABLE and CREATE INDEX statements.
//!
//! Each [`ModelDescriptor`] renders its own DDL against a dialect; the
//! [`Orm`](crate::orm::Orm) drives creation in foreign-key dependency order
//! and drops in reverse. Constraint and index names embed a stable digest
//! of the column and table names to bound identifier length.

use quarry_core::QuarryResult;

use crate::descriptor::ModelDescriptor;
use crate::dialect::{AutoIncrement, Dialect};
use crate::fields::OnDelete;
use crate::orm::Orm;
use crate::registry::ModelRegistry;

// The digest reproduces CPython's classic string/tuple hashing so the
// generated identifiers stay stable across releases and platforms.

fn string_hash(s: &str) -> i64 {
    if s.is_empty() {
        return 0;
    }
    let bytes = s.as_bytes();
    let mut x: i64 = i64::from(bytes[0]) << 7;
    for &b in bytes {
        x = 1_000_003_i64.wrapping_mul(x) ^ i64::from(b);
    }
    x ^= bytes.len() as i64;
    if x == -1 {
        -2
    } else {
        x
    }
}

fn string_list_hash(items: &[&str]) -> i64 {
    let mut x: i64 = 0x0034_5678;
    let mut mult: i64 = 1_000_003;
    let mut len = items.len() as i64;
    for s in items {
        len -= 1;
        x = (x ^ string_hash(s)).wrapping_mul(mult);
        mult = mult.wrapping_add(82520 + len + len);
    }
    x = x.wrapping_add(97531);
    if x == -1 {
        -2
    } else {
        x
    }
}

/// A short stable hex digest of the given names.
pub(crate) fn digest(items: &[&str]) -> String {
    format!("{:x}", string_list_hash(items).unsigned_abs() & 0xFFFF_FFFF)
}

impl ModelDescriptor {
    /// Renders the statements creating this model's table and its indices.
    ///
    /// The first statement is the `CREATE TABLE`; one `CREATE INDEX`
    /// follows per indexed field (explicit `db_index` or implicit via a
    /// foreign key).
    pub fn create_table_sql(
        &self,
        registry: &ModelRegistry,
        dialect: Dialect,
    ) -> QuarryResult<Vec<String>> {
        let traits = dialect.traits();
        let quoted_table = dialect.quote_ident(self.table());

        let mut prop_sql: Vec<String> = Vec::new();
        let mut constraint_sql: Vec<String> = Vec::new();

        for field in self.local_fields() {
            let quoted_col = dialect.quote_ident(&field.column);
            let mut field_sql = format!(
                "{quoted_col} {}",
                dialect.column_type(field.field_type, field.max_length)
            );

            if !field.null {
                field_sql.push_str(" NOT NULL");
            }
            if field.unique {
                field_sql.push_str(" UNIQUE");
            }
            if field.name == self.primary_key() {
                field_sql.push_str(" PRIMARY KEY");
            }
            if field.auto_increment {
                match traits.auto_increment {
                    AutoIncrement::Keyword(keyword) => {
                        field_sql.push(' ');
                        field_sql.push_str(keyword);
                    }
                    AutoIncrement::SerialColumn => {
                        field_sql = format!("{quoted_col} serial PRIMARY KEY");
                    }
                    AutoIncrement::Unsupported => {}
                }
            }

            if let Some(target) = &field.foreign_model {
                let foreign = registry.descriptor(target)?;
                let foreign_field = foreign.local_field("pk")?;
                let reference = format!(
                    "REFERENCES {} ({})",
                    dialect.quote_ident(foreign.table()),
                    dialect.quote_ident(&foreign_field.column)
                );
                let mut on_delete = match field.on_delete {
                    OnDelete::NoAction => None,
                    OnDelete::Cascade => Some(" ON DELETE CASCADE"),
                    OnDelete::SetNull => Some(" ON DELETE SET NULL"),
                    OnDelete::Restrict => Some(" ON DELETE RESTRICT"),
                };

                if traits.table_level_foreign_keys {
                    let constraint_name = format!(
                        "FK_{}_{}",
                        field.column,
                        digest(&[field.column.as_str(), self.table()])
                    );
                    let mut constraint = format!(
                        "CONSTRAINT {} FOREIGN KEY ({quoted_col}) {reference}",
                        dialect.quote_ident(&constraint_name)
                    );
                    if let Some(clause) = on_delete {
                        constraint.push_str(clause);
                    }
                    constraint_sql.push(constraint);
                } else {
                    field_sql.push(' ');
                    field_sql.push_str(&reference);
                    if dialect == Dialect::Mssql && field.on_delete == OnDelete::Restrict {
                        tracing::warn!(
                            target: "quarry_db",
                            column = %field.column,
                            "MSSQL does not support RESTRICT constraints"
                        );
                        on_delete = None;
                    }
                    if let Some(clause) = on_delete {
                        field_sql.push_str(clause);
                    }
                }

                if traits.deferrable_foreign_keys {
                    field_sql.push_str(" DEFERRABLE INITIALLY DEFERRED");
                }
            }

            prop_sql.push(field_sql);
        }

        if !constraint_sql.is_empty() {
            prop_sql.push(constraint_sql.join(", "));
        }

        if !self.unique_together().is_empty() {
            let columns = self
                .unique_together()
                .iter()
                .map(|name| Ok(dialect.quote_ident(&self.local_field(name)?.column)))
                .collect::<QuarryResult<Vec<String>>>()?;
            prop_sql.push(format!("UNIQUE ({})", columns.join(", ")));
        }

        let mut queries = vec![format!(
            "CREATE TABLE {quoted_table} ({})",
            prop_sql.join(", ")
        )];

        for field in self.local_fields() {
            if field.db_index {
                let index_name = format!("{}_{}", self.table(), digest(&[field.column.as_str()]));
                queries.push(format!(
                    "CREATE INDEX {} ON {quoted_table} ({})",
                    dialect.quote_ident(&index_name),
                    dialect.quote_ident(&field.column)
                ));
            }
        }

        Ok(queries)
    }

    /// Creates this model's table and indices on the live connection.
    pub fn create_table(&self, orm: &Orm) -> QuarryResult<()> {
        for sql in self.create_table_sql(orm.models(), orm.dialect())? {
            orm.run_execute(&sql, &[])?;
        }
        Ok(())
    }

    /// Drops this model's table. Dropping a table absent from the live
    /// schema is a no-op success.
    pub fn drop_table(&self, orm: &Orm) -> QuarryResult<()> {
        if !orm.table_names()?.iter().any(|t| t == self.table()) {
            return Ok(());
        }
        let sql = format!("DROP TABLE {}", orm.dialect().quote_ident(self.table()));
        orm.run_execute(&sql, &[])?;
        Ok(())
    }
}

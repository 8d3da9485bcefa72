//! Database dialect enumeration and the per-dialect traits table.
//!
//! All dialect-specific behavior is gathered here: identifier quoting,
//! column type mapping, auto-increment syntax, pagination style, and the
//! LIKE-comparison capabilities consulted by filter rendering. Every other
//! module asks this table instead of branching on the dialect itself.

use crate::fields::FieldType;

/// The SQL dialect of the connected database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
    /// Microsoft SQL Server.
    Mssql,
    /// A generic engine that could not be identified; rendered with the
    /// default (ANSI-leaning) syntax.
    Unknown,
}

/// How a dialect expresses an auto-incrementing primary key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrement {
    /// A keyword appended to the column clause.
    Keyword(&'static str),
    /// The whole column clause is rewritten to `<col> serial PRIMARY KEY`.
    SerialColumn,
    /// The dialect has no inline auto-increment syntax.
    Unsupported,
}

/// How a dialect paginates a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT n OFFSET m`, with a dialect sentinel standing in for "no
    /// limit" when only an offset is requested.
    LimitOffset {
        /// The value rendered for an unbounded LIMIT, if the dialect
        /// requires one before OFFSET.
        no_limit_sentinel: Option<&'static str>,
    },
    /// `OFFSET n ROWS FETCH NEXT m ROWS ONLY` (requires an ORDER BY).
    OffsetFetch,
}

/// How case-insensitive string comparisons are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFolding {
    /// Plain `LIKE`; the server collation decides case sensitivity.
    Collation,
    /// Fold both sides through `UPPER(...)`.
    UpperFold,
}

/// The capability table consulted by SQL rendering.
#[derive(Debug, Clone, Copy)]
pub struct DialectTraits {
    /// Quote characters for identifiers (open, close).
    pub quote: (char, char),
    /// Keyword for a case-sensitive LIKE comparison.
    pub sensitive_like: &'static str,
    /// Rendering of case-insensitive comparisons.
    pub case_folding: CaseFolding,
    /// Suffix appended after every LIKE placeholder (SQLite needs an
    /// explicit ESCAPE clause for the `\%`/`\_` escapes we bind).
    pub like_suffix: &'static str,
    /// Auto-increment syntax.
    pub auto_increment: AutoIncrement,
    /// Pagination style.
    pub pagination: Pagination,
    /// Whether foreign-key references gain `DEFERRABLE INITIALLY DEFERRED`.
    pub deferrable_foreign_keys: bool,
    /// Whether foreign keys are emitted as named table-level constraints
    /// instead of inline `REFERENCES` clauses.
    pub table_level_foreign_keys: bool,
}

impl Dialect {
    /// Returns the capability table for this dialect.
    pub const fn traits(self) -> DialectTraits {
        match self {
            Self::MySql => DialectTraits {
                quote: ('`', '`'),
                sensitive_like: "LIKE BINARY",
                case_folding: CaseFolding::Collation,
                like_suffix: "",
                auto_increment: AutoIncrement::Keyword("AUTO_INCREMENT"),
                pagination: Pagination::LimitOffset {
                    // 2^64 - 1, as recommended by the MySQL documentation.
                    no_limit_sentinel: Some("18446744073709551615"),
                },
                deferrable_foreign_keys: false,
                table_level_foreign_keys: true,
            },
            Self::Postgres => DialectTraits {
                quote: ('"', '"'),
                sensitive_like: "LIKE",
                case_folding: CaseFolding::UpperFold,
                like_suffix: "",
                auto_increment: AutoIncrement::SerialColumn,
                pagination: Pagination::LimitOffset {
                    no_limit_sentinel: None,
                },
                deferrable_foreign_keys: true,
                table_level_foreign_keys: false,
            },
            Self::Sqlite => DialectTraits {
                quote: ('"', '"'),
                sensitive_like: "LIKE",
                case_folding: CaseFolding::Collation,
                like_suffix: " ESCAPE '\\'",
                auto_increment: AutoIncrement::Keyword("AUTOINCREMENT"),
                pagination: Pagination::LimitOffset {
                    no_limit_sentinel: Some("-1"),
                },
                deferrable_foreign_keys: false,
                table_level_foreign_keys: false,
            },
            Self::Mssql => DialectTraits {
                quote: ('[', ']'),
                sensitive_like: "LIKE",
                case_folding: CaseFolding::Collation,
                like_suffix: "",
                auto_increment: AutoIncrement::Keyword("IDENTITY(1,1)"),
                pagination: Pagination::OffsetFetch,
                deferrable_foreign_keys: false,
                table_level_foreign_keys: false,
            },
            Self::Unknown => DialectTraits {
                quote: ('"', '"'),
                sensitive_like: "LIKE",
                case_folding: CaseFolding::Collation,
                like_suffix: "",
                auto_increment: AutoIncrement::Unsupported,
                pagination: Pagination::LimitOffset {
                    no_limit_sentinel: None,
                },
                deferrable_foreign_keys: false,
                table_level_foreign_keys: false,
            },
        }
    }

    /// Quotes an identifier for this dialect.
    pub fn quote_ident(self, ident: &str) -> String {
        let (open, close) = self.traits().quote;
        format!("{open}{ident}{close}")
    }

    /// Maps a semantic field type to this dialect's column type, honoring
    /// `max_length` where the type is sized.
    pub fn column_type(self, field_type: FieldType, max_length: usize) -> String {
        match field_type {
            FieldType::Bool => match self {
                Self::Postgres => "boolean".to_string(),
                Self::Mssql => "bit".to_string(),
                _ => "bool".to_string(),
            },
            FieldType::Int => match self {
                Self::Mssql => "int".to_string(),
                _ => "integer".to_string(),
            },
            FieldType::Long => "bigint".to_string(),
            FieldType::Double => "real".to_string(),
            FieldType::Text | FieldType::TextList => match self {
                Self::Mssql => {
                    if max_length > 0 {
                        format!("nvarchar({max_length})")
                    } else {
                        "nvarchar(max)".to_string()
                    }
                }
                _ => {
                    if max_length > 0 {
                        format!("varchar({max_length})")
                    } else {
                        "text".to_string()
                    }
                }
            },
            FieldType::Date => "date".to_string(),
            FieldType::Time => "time".to_string(),
            FieldType::DateTime => match self {
                Self::Postgres => "timestamp".to_string(),
                _ => "datetime".to_string(),
            },
            FieldType::Bytes => match self {
                Self::Postgres => "bytea".to_string(),
                Self::Mssql => {
                    if max_length > 0 {
                        format!("varbinary({max_length})")
                    } else {
                        "varbinary(max)".to_string()
                    }
                }
                _ => {
                    if max_length > 0 {
                        format!("blob({max_length})")
                    } else {
                        "blob".to_string()
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(Dialect::Sqlite.quote_ident("book"), "\"book\"");
        assert_eq!(Dialect::MySql.quote_ident("book"), "`book`");
        assert_eq!(Dialect::Mssql.quote_ident("book"), "[book]");
    }

    #[test]
    fn test_bool_column_type() {
        assert_eq!(Dialect::Sqlite.column_type(FieldType::Bool, 0), "bool");
        assert_eq!(Dialect::Postgres.column_type(FieldType::Bool, 0), "boolean");
        assert_eq!(Dialect::Mssql.column_type(FieldType::Bool, 0), "bit");
    }

    #[test]
    fn test_text_column_type_sizing() {
        assert_eq!(Dialect::Sqlite.column_type(FieldType::Text, 45), "varchar(45)");
        assert_eq!(Dialect::Sqlite.column_type(FieldType::Text, 0), "text");
        assert_eq!(Dialect::Mssql.column_type(FieldType::Text, 45), "nvarchar(45)");
        assert_eq!(Dialect::Mssql.column_type(FieldType::Text, 0), "nvarchar(max)");
    }

    #[test]
    fn test_text_list_maps_like_text() {
        assert_eq!(
            Dialect::MySql.column_type(FieldType::TextList, 255),
            "varchar(255)"
        );
    }

    #[test]
    fn test_bytes_column_type() {
        assert_eq!(Dialect::Sqlite.column_type(FieldType::Bytes, 0), "blob");
        assert_eq!(Dialect::Sqlite.column_type(FieldType::Bytes, 16), "blob(16)");
        assert_eq!(Dialect::Postgres.column_type(FieldType::Bytes, 16), "bytea");
        assert_eq!(
            Dialect::Mssql.column_type(FieldType::Bytes, 0),
            "varbinary(max)"
        );
    }

    #[test]
    fn test_datetime_column_type() {
        assert_eq!(
            Dialect::Postgres.column_type(FieldType::DateTime, 0),
            "timestamp"
        );
        assert_eq!(
            Dialect::MySql.column_type(FieldType::DateTime, 0),
            "datetime"
        );
    }

    #[test]
    fn test_auto_increment_styles() {
        assert_eq!(
            Dialect::Sqlite.traits().auto_increment,
            AutoIncrement::Keyword("AUTOINCREMENT")
        );
        assert_eq!(
            Dialect::MySql.traits().auto_increment,
            AutoIncrement::Keyword("AUTO_INCREMENT")
        );
        assert_eq!(
            Dialect::Mssql.traits().auto_increment,
            AutoIncrement::Keyword("IDENTITY(1,1)")
        );
        assert_eq!(
            Dialect::Postgres.traits().auto_increment,
            AutoIncrement::SerialColumn
        );
        assert_eq!(
            Dialect::Unknown.traits().auto_increment,
            AutoIncrement::Unsupported
        );
    }

    #[test]
    fn test_pagination_styles() {
        assert_eq!(Dialect::Mssql.traits().pagination, Pagination::OffsetFetch);
        assert_eq!(
            Dialect::Sqlite.traits().pagination,
            Pagination::LimitOffset {
                no_limit_sentinel: Some("-1")
            }
        );
        assert_eq!(
            Dialect::MySql.traits().pagination,
            Pagination::LimitOffset {
                no_limit_sentinel: Some("18446744073709551615")
            }
        );
    }
}

//! The boolean filter expression tree.
//!
//! A [`Filter`] is an immutable predicate over model fields, built from
//! leaves ([`Filter::new`]) and combined with the `&` (AND), `|` (OR) and
//! `!` (NOT) operators:
//!
//! ```
//! use quarry_db::filter::{Filter, Op};
//! use quarry_db::value::Value;
//!
//! let adults = Filter::new("age", Op::GreaterOrEquals, Value::Int(18));
//! let named = Filter::new("name", Op::StartsWith, Value::from("Al"));
//! let both = adults & named;
//! let either = both.clone() | Filter::new("vip", Op::Equals, Value::Bool(true));
//! let excluded = !either;
//! # let _ = excluded;
//! ```
//!
//! Negation rewrites leaf operators in place where a direct algebraic
//! inverse exists (`Equals` becomes `NotEquals`, `GreaterThan` becomes
//! `LessOrEquals`, `IsNull` flips its polarity) so the rendered SQL stays
//! minimal; operators without an inverse carry a negated flag instead.
//! The empty filter matches everything; its negation matches nothing, and
//! both are absorbed by `&`/`|` so they never clutter rendered SQL.
//!
//! Rendering ([`Filter::sql`]) and value binding ([`Filter::bind_values`])
//! walk the tree in the same order; any change to one must be mirrored in
//! the other so placeholders and bound values stay in lock-step.

use std::fmt;
use std::ops;

use quarry_core::QuarryResult;

use crate::dialect::{CaseFolding, Dialect};
use crate::value::Value;

/// A leaf comparison operator.
///
/// The case-insensitive variants (`IEquals`, `IStartsWith`, ...) render
/// through `UPPER(...)` folding on PostgreSQL and through the server
/// collation's `LIKE` elsewhere; the two are equivalent for ASCII but not
/// for all Unicode case pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`
    Equals,
    /// `!=`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `>=`
    GreaterOrEquals,
    /// `<=`
    LessOrEquals,
    /// `LIKE 'value%'`
    StartsWith,
    /// `LIKE '%value'`
    EndsWith,
    /// `LIKE '%value%'`
    Contains,
    /// `IN (...)`; the value must be a [`Value::List`].
    IsIn,
    /// `IS NULL` when the boolean payload is true, `IS NOT NULL` otherwise.
    IsNull,
    /// Case-insensitive `=`.
    IEquals,
    /// Case-insensitive `!=`.
    INotEquals,
    /// Case-insensitive `StartsWith`.
    IStartsWith,
    /// Case-insensitive `EndsWith`.
    IEndsWith,
    /// Case-insensitive `Contains`.
    IContains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combine {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Empty {
        negated: bool,
    },
    Leaf {
        key: String,
        op: Op,
        value: Value,
        negated: bool,
    },
    Combine {
        kind: Combine,
        children: Vec<Filter>,
        negated: bool,
    },
}

/// An immutable boolean predicate tree over model fields.
///
/// Leaf keys are unresolved field paths (`score`, `author__name`); the
/// path/join compiler rewrites them into qualified columns before the tree
/// is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    node: Node,
}

impl Default for Filter {
    /// The empty filter, matching every row.
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// A filter matching every row. Renders to nothing.
    pub const fn all() -> Self {
        Self {
            node: Node::Empty { negated: false },
        }
    }

    /// A filter matching no row. Renders to `1 != 0`.
    pub const fn none() -> Self {
        Self {
            node: Node::Empty { negated: true },
        }
    }

    /// A leaf comparison on the given field path.
    pub fn new(key: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            node: Node::Leaf {
                key: key.into(),
                op,
                value: value.into(),
                negated: false,
            },
        }
    }

    /// Returns `true` if this filter matches everything.
    pub const fn is_all(&self) -> bool {
        matches!(self.node, Node::Empty { negated: false })
    }

    /// Returns `true` if this filter matches nothing.
    pub const fn is_none(&self) -> bool {
        matches!(self.node, Node::Empty { negated: true })
    }

    /// Renders this filter to a SQL fragment for the given dialect.
    ///
    /// The empty filter renders to an empty string (the caller omits the
    /// WHERE clause entirely); the match-nothing filter renders `1 != 0`.
    pub fn sql(&self, dialect: Dialect) -> String {
        match &self.node {
            Node::Empty { negated } => {
                if *negated {
                    "1 != 0".to_string()
                } else {
                    String::new()
                }
            }
            Node::Leaf {
                key,
                op,
                value,
                negated,
            } => leaf_sql(key, *op, value, *negated, dialect),
            Node::Combine {
                kind,
                children,
                negated,
            } => {
                let bits: Vec<String> = children
                    .iter()
                    .map(|child| {
                        let atom = child.sql(dialect);
                        if matches!(child.node, Node::Combine { .. }) {
                            format!("({atom})")
                        } else {
                            atom
                        }
                    })
                    .collect();
                let joined = bits.join(match kind {
                    Combine::And => " AND ",
                    Combine::Or => " OR ",
                });
                if *negated {
                    format!("NOT ({joined})")
                } else {
                    joined
                }
            }
        }
    }

    /// Appends this filter's bound values to `params`, in the exact order
    /// the placeholders were emitted by [`sql`](Self::sql).
    pub fn bind_values(&self, params: &mut Vec<Value>) {
        match &self.node {
            Node::Empty { .. } => {}
            Node::Leaf { op, value, .. } => match op {
                Op::IsIn => params.extend(value.as_list().iter().cloned()),
                Op::IsNull => {}
                Op::StartsWith | Op::IStartsWith => {
                    params.push(Value::String(format!("{}%", escape_like(value))));
                }
                Op::EndsWith | Op::IEndsWith => {
                    params.push(Value::String(format!("%{}", escape_like(value))));
                }
                Op::Contains | Op::IContains => {
                    params.push(Value::String(format!("%{}%", escape_like(value))));
                }
                _ => params.push(value.clone()),
            },
            Node::Combine { children, .. } => {
                for child in children {
                    child.bind_values(params);
                }
            }
        }
    }

    /// Rewrites every leaf key through `resolve`, in rendering order. Used
    /// by the path/join compiler to qualify field paths into columns.
    pub(crate) fn resolve_keys<F>(&mut self, resolve: &mut F) -> QuarryResult<()>
    where
        F: FnMut(&str) -> QuarryResult<String>,
    {
        match &mut self.node {
            Node::Empty { .. } => Ok(()),
            Node::Leaf { key, .. } => {
                *key = resolve(key)?;
                Ok(())
            }
            Node::Combine { children, .. } => {
                for child in children {
                    child.resolve_keys(resolve)?;
                }
                Ok(())
            }
        }
    }
}

impl ops::BitAnd for Filter {
    type Output = Self;

    fn bitand(self, other: Self) -> Self::Output {
        if self.is_all() || other.is_none() {
            return other;
        }
        if self.is_none() || other.is_all() {
            return self;
        }
        match self.node {
            // Flatten chained ANDs so (a & b) & c stores three siblings.
            Node::Combine {
                kind: Combine::And,
                mut children,
                negated: false,
            } => {
                children.push(other);
                Self {
                    node: Node::Combine {
                        kind: Combine::And,
                        children,
                        negated: false,
                    },
                }
            }
            node => Self {
                node: Node::Combine {
                    kind: Combine::And,
                    children: vec![Self { node }, other],
                    negated: false,
                },
            },
        }
    }
}

impl ops::BitOr for Filter {
    type Output = Self;

    fn bitor(self, other: Self) -> Self::Output {
        if self.is_all() || other.is_none() {
            return self;
        }
        if self.is_none() || other.is_all() {
            return other;
        }
        match self.node {
            Node::Combine {
                kind: Combine::Or,
                mut children,
                negated: false,
            } => {
                children.push(other);
                Self {
                    node: Node::Combine {
                        kind: Combine::Or,
                        children,
                        negated: false,
                    },
                }
            }
            node => Self {
                node: Node::Combine {
                    kind: Combine::Or,
                    children: vec![Self { node }, other],
                    negated: false,
                },
            },
        }
    }
}

impl ops::Not for Filter {
    type Output = Self;

    fn not(self) -> Self::Output {
        let node = match self.node {
            Node::Empty { negated } => Node::Empty { negated: !negated },
            Node::Leaf {
                key,
                op,
                value,
                negated,
            } => match op {
                Op::IsNull => Node::Leaf {
                    key,
                    op,
                    value: Value::Bool(!value.as_bool().unwrap_or(false)),
                    negated,
                },
                Op::Equals => rewritten(key, Op::NotEquals, value, negated),
                Op::NotEquals => rewritten(key, Op::Equals, value, negated),
                Op::IEquals => rewritten(key, Op::INotEquals, value, negated),
                Op::INotEquals => rewritten(key, Op::IEquals, value, negated),
                Op::GreaterThan => rewritten(key, Op::LessOrEquals, value, negated),
                Op::LessThan => rewritten(key, Op::GreaterOrEquals, value, negated),
                Op::GreaterOrEquals => rewritten(key, Op::LessThan, value, negated),
                Op::LessOrEquals => rewritten(key, Op::GreaterThan, value, negated),
                Op::StartsWith
                | Op::IStartsWith
                | Op::EndsWith
                | Op::IEndsWith
                | Op::Contains
                | Op::IContains
                | Op::IsIn => Node::Leaf {
                    key,
                    op,
                    value,
                    negated: !negated,
                },
            },
            Node::Combine {
                kind,
                children,
                negated,
            } => Node::Combine {
                kind,
                children,
                negated: !negated,
            },
        };
        Self { node }
    }
}

fn rewritten(key: String, op: Op, value: Value, negated: bool) -> Node {
    Node::Leaf {
        key,
        op,
        value,
        negated,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Empty { negated: false } => write!(f, "Filter(all)"),
            Node::Empty { negated: true } => write!(f, "Filter(none)"),
            Node::Leaf {
                key,
                op,
                value,
                negated,
            } => write!(
                f,
                "Filter(key=\"{key}\", op={op:?}, value=\"{value}\", negated={negated})"
            ),
            Node::Combine {
                kind,
                children,
                negated,
            } => {
                let glue = match kind {
                    Combine::And => " && ",
                    Combine::Or => " || ",
                };
                let bits: Vec<String> = children.iter().map(ToString::to_string).collect();
                if *negated {
                    write!(f, "!({})", bits.join(glue))
                } else {
                    write!(f, "{}", bits.join(glue))
                }
            }
        }
    }
}

/// Escapes `%` and `_` in a LIKE operand before wildcard wrapping.
fn escape_like(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace('%', "\\%").replace('_', "\\_")
}

fn leaf_sql(key: &str, op: Op, value: &Value, negated: bool, dialect: Dialect) -> String {
    let traits = dialect.traits();
    match op {
        Op::Equals => format!("{key} = ?"),
        Op::NotEquals => format!("{key} != ?"),
        Op::GreaterThan => format!("{key} > ?"),
        Op::LessThan => format!("{key} < ?"),
        Op::GreaterOrEquals => format!("{key} >= ?"),
        Op::LessOrEquals => format!("{key} <= ?"),
        Op::IsIn => {
            let holders = vec!["?"; value.as_list().len()].join(", ");
            if negated {
                format!("{key} NOT IN ({holders})")
            } else {
                format!("{key} IN ({holders})")
            }
        }
        Op::IsNull => {
            if value.as_bool().unwrap_or(false) {
                format!("{key} IS NULL")
            } else {
                format!("{key} IS NOT NULL")
            }
        }
        Op::StartsWith | Op::EndsWith | Op::Contains => {
            let word = if negated {
                format!("NOT {}", traits.sensitive_like)
            } else {
                traits.sensitive_like.to_string()
            };
            format!("{key} {word} ?{}", traits.like_suffix)
        }
        Op::IStartsWith | Op::IEndsWith | Op::IContains | Op::IEquals => {
            let word = if negated { "NOT LIKE" } else { "LIKE" };
            insensitive_like(key, word, traits.case_folding, traits.like_suffix)
        }
        Op::INotEquals => {
            let word = if negated { "LIKE" } else { "NOT LIKE" };
            insensitive_like(key, word, traits.case_folding, traits.like_suffix)
        }
    }
}

fn insensitive_like(key: &str, word: &str, folding: CaseFolding, suffix: &str) -> String {
    match folding {
        CaseFolding::UpperFold => format!("UPPER({key}::text) {word} UPPER(?)"),
        CaseFolding::Collation => format!("{key} {word} ?{suffix}"),
    }
}

//! # quarry-db
//!
//! The quarry ORM engine. A [`ModelDescriptor`](descriptor::ModelDescriptor)
//! is derived once from a declarative [`ModelSpec`](model::ModelSpec) and
//! answers all structural questions; a [`QuerySet`](queryset::QuerySet)
//! accumulates an immutable [`Filter`](filter::Filter) tree plus ordering and
//! slicing, and only touches the database when a terminal method runs. SQL is
//! produced per [`Dialect`](dialect::Dialect) by the path/join
//! [`Compiler`](compiler::Compiler) and handed to an
//! [`ExecutionChannel`](channel::ExecutionChannel).
//!
//! ## Architecture
//!
//! Everything hangs off an explicitly constructed [`Orm`](orm::Orm) context:
//! the model registry, the per-thread connection registry, and the debug
//! toggle. There is no global state; clone the (cheap) `Orm` handle and pass
//! it where it is needed.
//!
//! ## Module overview
//!
//! - [`value`] - the backend-agnostic [`Value`](value::Value) enum
//! - [`fields`] - field metadata ([`FieldDef`](fields::FieldDef)) and types
//! - [`model`] - the [`Model`](model::Model) trait and declarative specs
//! - [`descriptor`] - reflected per-model schema metadata
//! - [`registry`] - the model registry with dependency ordering
//! - [`filter`] - the boolean filter expression tree
//! - [`dialect`] - dialect enumeration and the per-dialect traits table
//! - [`compiler`] - relational-path-to-join compilation
//! - [`queryset`] - the lazy queryset execution engine
//! - [`schema`] - CREATE/DROP TABLE and index generation
//! - [`channel`] - the execution-channel abstraction
//! - [`connections`] - the per-thread connection registry
//! - [`orm`] - the context object tying it all together

// These clippy lints are intentionally allowed for the ORM crate:
// - struct_excessive_bools: FieldDef mirrors a field API that uses many booleans
// - too_many_lines: the SQL rendering methods are inherently large match blocks
// - result_large_err: QuarryError is the crate error type and is used consistently
// - format_push_string: format! with push_str is clearer than write! for SQL assembly
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

pub mod channel;
pub mod compiler;
pub mod connections;
pub mod descriptor;
pub mod dialect;
pub mod fields;
pub mod filter;
pub mod model;
pub mod orm;
pub mod queryset;
pub mod registry;
pub mod schema;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use channel::{ChannelFactory, ExecutionChannel, FromValue, Row};
pub use descriptor::ModelDescriptor;
pub use dialect::Dialect;
pub use fields::{FieldDef, FieldType, OnDelete};
pub use filter::{Filter, Op};
pub use model::{DeclaredType, Model, ModelSpec, PropertySpec};
pub use orm::Orm;
pub use queryset::{Aggregate, QuerySet};
pub use registry::ModelRegistry;
pub use value::Value;

//! Core error types for the quarry ORM.
//!
//! This module provides the [`QuarryError`] enum covering every failure
//! category the ORM can report: configuration and connection problems,
//! schema resolution failures, execution errors surfaced by the database
//! engine, and cardinality errors from single-object lookups.

use thiserror::Error;

/// The primary error type for the quarry ORM.
///
/// The variants fall into four groups:
///
/// - *configuration errors* (`Configuration`, `Operational`) are reported
///   synchronously from setup calls and are fatal to subsequent operations;
/// - *schema errors* (`UnknownModel`, `UnknownField`, `InvalidFieldPath`,
///   `DependencyCycle`) indicate a programming mistake and fail fast;
/// - *execution errors* (`Database`) wrap the engine-native message from a
///   rejected statement;
/// - *cardinality errors* (`NotFound`) signal that a single-object lookup
///   matched zero or more than one row.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// The database setup is invalid (unsupported or undetected dialect).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A connection could not be opened or has become unusable.
    #[error("operational error: {0}")]
    Operational(String),

    /// No model with the given class name has been registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A field name does not exist on the model it was looked up on.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A traversal path could not be resolved to a column (no forward or
    /// reverse relation matched, or the terminal segment is not a field).
    #[error("invalid field lookup: {0}")]
    InvalidFieldPath(String),

    /// The registered models contain a foreign-key cycle, so no valid
    /// table creation order exists.
    #[error("foreign key dependency cycle involving model: {0}")]
    DependencyCycle(String),

    /// The execution channel rejected a statement. The message is the
    /// engine-native error text.
    #[error("database error: {0}")]
    Database(String),

    /// A single-object lookup matched zero rows, or more than one.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The requested operation is not supported in the current queryset
    /// state (e.g. UPDATE or DELETE on a sliced queryset).
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// A convenience type alias for `Result<T, QuarryError>`.
pub type QuarryResult<T> = Result<T, QuarryError>;

//! # quarry-core
//!
//! Foundation types shared by the quarry ORM crates: the [`QuarryError`]
//! error taxonomy and `tracing`-based logging helpers.

pub mod error;
pub mod logging;

pub use error::{QuarryError, QuarryResult};

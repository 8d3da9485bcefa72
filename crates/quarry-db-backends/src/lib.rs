//! # quarry-db-backends
//!
//! Concrete execution channels for the quarry ORM. Currently ships a
//! synchronous SQLite channel built on `rusqlite`, the [`DatabaseConfig`]
//! connection configuration (which doubles as the channel factory for the
//! per-thread connection registry), and probe-based dialect detection for
//! generic channels.

pub mod config;
pub mod probe;
pub mod sqlite;

pub use config::DatabaseConfig;
pub use probe::{dialect_for_driver, probe_dialect};
pub use sqlite::SqliteChannel;

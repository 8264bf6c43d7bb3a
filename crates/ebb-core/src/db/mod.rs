//! `SQLite` persistence for ebb

mod conflict_log;
mod connection;
mod migrations;

pub use conflict_log::SqliteConflictLog;
pub use connection::Database;

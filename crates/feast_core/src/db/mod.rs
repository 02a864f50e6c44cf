//! SQLite store bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Resolve the on-disk location of the restaurant store.
//! - Open and configure SQLite connections, applying migrations in order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No restaurant row is read or written before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{database_directory, open_store, open_store_in_memory, OpenedStore};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The store was written by a newer schema this binary cannot migrate from.
    MissingSourceModel {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Stable error code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "db_sqlite_error",
            Self::MissingSourceModel { .. } => "db_missing_source_model",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingSourceModel {
                db_version,
                latest_supported,
            } => write!(
                f,
                "no migration path from store schema {db_version} (latest supported is {latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingSourceModel { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

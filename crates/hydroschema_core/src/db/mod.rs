//! SQLite database handle, connection bootstrap and file transactions.
//!
//! # Responsibility
//! - Own the path of one SpatiaLite/GeoPackage file and its cached connection.
//! - Configure connection pragmas and load the spatial extension.
//! - Provide copy-based file transactions for crash-safe rewrites.
//! - Host the migration chain and its version bookkeeping.
//!
//! # Invariants
//! - A handle owns at most one live connection at a time.
//! - Changing the handle path closes the cached connection.
//! - The original file is only replaced after a file transaction commits.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod transaction;

pub use open::{
    table_exists, ConnectHook, DatabaseConfig, SchemaDatabase, DEFAULT_SPATIALITE_LIBRARY,
    SPATIALITE_LIBRARY_ENV,
};
pub use transaction::FileTransaction;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    /// Database content does not match what the schema layer expects.
    InvalidData(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "database file i/o failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid database content: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

//! Orchestrator errors and non-fatal warnings.

use crate::db::DbError;
use crate::db::migrations::ChainError;
use crate::model::version::SchemaVersion;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug)]
pub enum SchemaError {
    Db(DbError),
    /// The file predates the oldest revision this crate can bridge.
    MigrationGap {
        current: SchemaVersion,
        minimum: SchemaVersion,
    },
    /// Requested options cannot be combined.
    Configuration(String),
    /// The operation needs a revision the database does not have yet.
    MigrationMissing {
        required: SchemaVersion,
        current: Option<SchemaVersion>,
    },
    UnknownRevision(SchemaVersion),
    NotReversible(SchemaVersion),
    /// Copying rows into a rebuilt file violated a database constraint.
    ConstraintViolation(String),
    ConversionFailed(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MigrationGap { current, minimum } => write!(
                f,
                "this tool cannot update versions below {minimum} (current: {current}); \
                 upgrade the file with an older release first"
            ),
            Self::Configuration(message) => write!(f, "invalid upgrade options: {message}"),
            Self::MigrationMissing { required, current } => match current {
                Some(current) => write!(
                    f,
                    "this operation requires schema version {required}, current version: {current}"
                ),
                None => write!(
                    f,
                    "this operation requires schema version {required}, database is unversioned"
                ),
            },
            Self::UnknownRevision(revision) => write!(f, "unknown schema revision {revision}"),
            Self::NotReversible(revision) => {
                write!(f, "migration {revision} cannot be downgraded")
            }
            Self::ConstraintViolation(message) => {
                write!(f, "upgrade failed on a constraint violation: {message}")
            }
            Self::ConversionFailed(message) => {
                write!(f, "geopackage conversion failed:\n{message}")
            }
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SchemaError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ChainError> for SchemaError {
    fn from(value: ChainError) -> Self {
        match value {
            ChainError::UnknownRevision(revision) => Self::UnknownRevision(revision),
            ChainError::NotReversible(revision) => Self::NotReversible(revision),
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl SchemaError {
    /// Maps SQLite constraint failures to `ConstraintViolation`.
    pub(crate) fn from_copy(err: DbError) -> Self {
        match err {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, message))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(message.unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Db(other),
        }
    }
}

/// Non-fatal anomaly reported next to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaWarning {
    /// The database is newer than the chain shipped with this crate.
    VersionAhead {
        database: SchemaVersion,
        library: SchemaVersion,
    },
    /// Diagnostic emitted by the format translator.
    Translator { message: String },
}

impl Display for SchemaWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VersionAhead { database, library } => write!(
                f,
                "database version is higher than the library version ({database} > {library}); \
                 results may be unexpected"
            ),
            Self::Translator { message } => write!(f, "translator: {message}"),
        }
    }
}

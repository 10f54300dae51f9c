//! Connection bootstrap and schema versioning for the entities store.
//!
//! Every connection handed to a repository comes from this module, with
//! pragmas set and the entity schema migrated to [`migrations::latest_version`].
//! Repositories re-check that version in `try_new`, so a raw connection
//! opened elsewhere is refused rather than silently written to.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{
    open_db, open_db_in_memory, open_db_with_timeout, open_existing_db, DEFAULT_BUSY_TIMEOUT,
};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening or migrating an entities database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build with more migrations.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// An existing-only open pointed at a path with no database file.
    MissingDatabase(PathBuf),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "entities schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingDatabase(path) => {
                write!(f, "no entities database at `{}`", path.display())
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::MissingDatabase(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

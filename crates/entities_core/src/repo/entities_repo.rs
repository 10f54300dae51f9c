//! Entities repository contract and error taxonomy.
//!
//! # Responsibility
//! - Define the storage capability every entities engine implements.
//! - Share precondition checks so engines reject the same inputs.
//!
//! # Invariants
//! - Not-found outcomes are values (`None`, `0`, empty), never errors.
//! - `save` is all-or-nothing per batch.
//! - `query` and `get_by_index` agree on ordering and index numbering.

use crate::db::DbError;
use crate::model::entity::{
    is_valid_list_name, Entity, EntityValidationError, SavedEntity, ID_COLUMN,
};
use crate::model::query::EntityQuery;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from entities repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// List name violates naming rules.
    InvalidListName(String),
    /// An entity in a save batch failed validation; nothing was written.
    Validation(EntityValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListName(list) => write!(f, "invalid entity list name `{list}`"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "entities repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "entities repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "entities repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidListName(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage capability for named entity lists.
pub trait EntitiesRepository {
    /// Inserts or overwrites `entities` in `list`, registering the list if needed.
    ///
    /// Overwrites replace every stored field and keep the entity's index.
    /// When one batch repeats an id, the later record wins.
    fn save(&self, list: &str, entities: &[Entity]) -> RepoResult<()>;
    /// Returns all registered list names.
    fn get_lists(&self) -> RepoResult<BTreeSet<String>>;
    /// Returns the number of entities in `list`; 0 when absent.
    fn get_count(&self, list: &str) -> RepoResult<usize>;
    /// Registers an empty list. Existing lists are left untouched.
    fn add_list(&self, list: &str) -> RepoResult<()>;
    /// Removes one entity. Absent ids are ignored.
    fn delete(&self, list: &str, id: &str) -> RepoResult<()>;
    /// Returns matching entities in index order.
    fn query(&self, list: &str, query: Option<&EntityQuery>) -> RepoResult<Vec<SavedEntity>>;
    /// Returns the entity at `index` in the unfiltered ordering.
    fn get_by_index(&self, list: &str, index: usize) -> RepoResult<Option<SavedEntity>>;
    /// Sets or replaces the integrity hash, registering the list if needed.
    fn update_list_hash(&self, list: &str, hash: &str) -> RepoResult<()>;
    /// Returns the last hash set for `list`.
    fn get_list_hash(&self, list: &str) -> RepoResult<Option<String>>;

    /// Returns one entity by id.
    fn get_by_id(&self, list: &str, id: &str) -> RepoResult<Option<SavedEntity>> {
        let query = EntityQuery::eq(ID_COLUMN, id);
        Ok(self.query(list, Some(&query))?.into_iter().next())
    }
}

/// Rejects list names that violate naming rules.
pub fn ensure_list_name(list: &str) -> RepoResult<()> {
    if is_valid_list_name(list) {
        Ok(())
    } else {
        Err(RepoError::InvalidListName(list.to_string()))
    }
}

/// Validates a whole batch before any engine mutates state.
pub fn validate_batch(list: &str, entities: &[Entity]) -> RepoResult<()> {
    ensure_list_name(list)?;
    for entity in entities {
        entity.validate()?;
    }
    Ok(())
}

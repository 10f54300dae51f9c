//! Core storage for named entity lists.
//! This crate owns the entities contract and its invariants; callers depend on
//! [`EntitiesRepository`] and pick an engine.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LogLevel,
    LoggingError,
};
pub use model::entity::{Entity, EntityState, EntityValidationError, SavedEntity};
pub use model::query::EntityQuery;
pub use repo::entities_repo::{EntitiesRepository, RepoError, RepoResult};
pub use repo::memory_repo::InMemoryEntitiesRepository;
pub use repo::sqlite_repo::SqliteEntitiesRepository;
pub use service::entities_service::{EntitiesService, SnapshotReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

//! In-memory implementation of the entities repository.
//!
//! Used by tests and by callers that need an ephemeral store with the same
//! semantics as the SQLite engine. Readers share a lock; writers hold it
//! exclusively for the whole batch.

use crate::model::entity::{Entity, SavedEntity};
use crate::model::query::EntityQuery;
use crate::repo::entities_repo::{ensure_list_name, validate_batch, EntitiesRepository, RepoResult};
use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct ListState {
    hash: Option<String>,
    // Insertion order is the index order.
    entities: IndexMap<String, Entity>,
}

/// Thread-safe, process-local entities repository.
#[derive(Debug, Default)]
pub struct InMemoryEntitiesRepository {
    lists: RwLock<BTreeMap<String, ListState>>,
}

impl InMemoryEntitiesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntitiesRepository for InMemoryEntitiesRepository {
    fn save(&self, list: &str, entities: &[Entity]) -> RepoResult<()> {
        validate_batch(list, entities)?;

        let mut lists = self.lists.write();
        let state = lists.entry(list.to_string()).or_default();
        for entity in entities {
            // `insert` keeps the existing slot for known ids.
            state.entities.insert(entity.id.clone(), entity.clone());
        }

        debug!(
            "event=entities_save module=repo status=ok engine=memory list={} batch_size={}",
            list,
            entities.len()
        );
        Ok(())
    }

    fn get_lists(&self) -> RepoResult<BTreeSet<String>> {
        Ok(self.lists.read().keys().cloned().collect())
    }

    fn get_count(&self, list: &str) -> RepoResult<usize> {
        ensure_list_name(list)?;
        Ok(self
            .lists
            .read()
            .get(list)
            .map_or(0, |state| state.entities.len()))
    }

    fn add_list(&self, list: &str) -> RepoResult<()> {
        ensure_list_name(list)?;
        self.lists.write().entry(list.to_string()).or_default();
        Ok(())
    }

    fn delete(&self, list: &str, id: &str) -> RepoResult<()> {
        ensure_list_name(list)?;
        if let Some(state) = self.lists.write().get_mut(list) {
            state.entities.shift_remove(id);
        }
        Ok(())
    }

    fn query(&self, list: &str, query: Option<&EntityQuery>) -> RepoResult<Vec<SavedEntity>> {
        ensure_list_name(list)?;
        let lists = self.lists.read();
        let Some(state) = lists.get(list) else {
            return Ok(Vec::new());
        };

        Ok(state
            .entities
            .values()
            .enumerate()
            .filter(|(_, entity)| query.map_or(true, |query| query.matches(entity)))
            .map(|(index, entity)| SavedEntity {
                index,
                entity: entity.clone(),
            })
            .collect())
    }

    fn get_by_index(&self, list: &str, index: usize) -> RepoResult<Option<SavedEntity>> {
        ensure_list_name(list)?;
        let lists = self.lists.read();
        Ok(lists
            .get(list)
            .and_then(|state| state.entities.get_index(index))
            .map(|(_, entity)| SavedEntity {
                index,
                entity: entity.clone(),
            }))
    }

    fn update_list_hash(&self, list: &str, hash: &str) -> RepoResult<()> {
        ensure_list_name(list)?;
        self.lists.write().entry(list.to_string()).or_default().hash = Some(hash.to_string());
        Ok(())
    }

    fn get_list_hash(&self, list: &str) -> RepoResult<Option<String>> {
        ensure_list_name(list)?;
        Ok(self
            .lists
            .read()
            .get(list)
            .and_then(|state| state.hash.clone()))
    }
}

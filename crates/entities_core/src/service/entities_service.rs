//! Entities use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for callers that work with entity lists.
//! - Apply server snapshots to local lists using the list hash.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - A snapshot whose hash matches the stored hash performs no writes.
//! - The list hash is written only after entity changes succeed.

use crate::model::entity::{Entity, EntityState, SavedEntity};
use crate::model::query::EntityQuery;
use crate::repo::entities_repo::{EntitiesRepository, RepoResult};
use indexmap::map::Entry;
use indexmap::IndexMap;
use log::info;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Outcome of applying one server snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Stored hash already matched; nothing was touched.
    pub unchanged_list: bool,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Local entities kept as they were.
    pub unchanged: usize,
}

/// Use-case service wrapper over an entities repository.
pub struct EntitiesService<R: EntitiesRepository> {
    repo: R,
}

impl<R: EntitiesRepository> EntitiesService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns the wrapped repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn save(&self, list: &str, entities: &[Entity]) -> RepoResult<()> {
        self.repo.save(list, entities)
    }

    pub fn lists(&self) -> RepoResult<BTreeSet<String>> {
        self.repo.get_lists()
    }

    pub fn count(&self, list: &str) -> RepoResult<usize> {
        self.repo.get_count(list)
    }

    pub fn query(&self, list: &str, query: Option<&EntityQuery>) -> RepoResult<Vec<SavedEntity>> {
        self.repo.query(list, query)
    }

    pub fn get_by_index(&self, list: &str, index: usize) -> RepoResult<Option<SavedEntity>> {
        self.repo.get_by_index(list, index)
    }

    pub fn get_by_id(&self, list: &str, id: &str) -> RepoResult<Option<SavedEntity>> {
        self.repo.get_by_id(list, id)
    }

    pub fn delete(&self, list: &str, id: &str) -> RepoResult<()> {
        self.repo.delete(list, id)
    }

    /// Returns whether `hash` differs from the hash stored for `list`.
    pub fn needs_update(&self, list: &str, hash: &str) -> RepoResult<bool> {
        Ok(self.repo.get_list_hash(list)?.as_deref() != Some(hash))
    }

    /// Reconciles `list` with a full server snapshot.
    ///
    /// # Contract
    /// - Matching hash: no writes, `unchanged_list = true`.
    /// - Server entities are stored as `Online` with `trunk_version = version`.
    /// - A local entity is replaced when its version is lower, or equal while
    ///   still `Offline`; newer local versions are kept.
    /// - Local `Online` entities missing from the snapshot are deleted;
    ///   `Offline` ones are kept as pending local creations.
    /// - A snapshot repeating an id counts once; the highest version wins,
    ///   and on equal versions the later copy wins.
    /// - The hash is stored last, so a failed apply is retried in full.
    pub fn apply_server_snapshot(
        &self,
        list: &str,
        server_hash: &str,
        entities: Vec<Entity>,
    ) -> RepoResult<SnapshotReport> {
        let started_at = Instant::now();
        if !self.needs_update(list, server_hash)? {
            info!("event=snapshot_apply module=service status=skipped list={list}");
            return Ok(SnapshotReport {
                unchanged_list: true,
                ..SnapshotReport::default()
            });
        }

        let local: HashMap<String, Entity> = self
            .repo
            .query(list, None)?
            .into_iter()
            .map(|saved| (saved.entity.id.clone(), saved.entity))
            .collect();

        let incoming_by_id = collapse_snapshot(entities);

        let mut report = SnapshotReport::default();
        let mut to_save = Vec::new();
        for incoming in incoming_by_id.values() {
            let incoming = incoming.clone().into_online();
            match local.get(&incoming.id) {
                None => {
                    report.added += 1;
                    to_save.push(incoming);
                }
                Some(existing) if should_replace(existing, &incoming) => {
                    report.updated += 1;
                    to_save.push(incoming);
                }
                Some(_) => report.unchanged += 1,
            }
        }

        self.repo.save(list, &to_save)?;

        for (id, existing) in &local {
            if incoming_by_id.contains_key(id) {
                continue;
            }
            if existing.state == EntityState::Online {
                self.repo.delete(list, id)?;
                report.deleted += 1;
            } else {
                report.unchanged += 1;
            }
        }

        self.repo.update_list_hash(list, server_hash)?;

        info!(
            "event=snapshot_apply module=service status=ok list={} added={} updated={} deleted={} unchanged={} duration_ms={}",
            list,
            report.added,
            report.updated,
            report.deleted,
            report.unchanged,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}

// Keeps first-seen order so the saved batch follows the server's ordering.
fn collapse_snapshot(entities: Vec<Entity>) -> IndexMap<String, Entity> {
    let mut by_id: IndexMap<String, Entity> = IndexMap::with_capacity(entities.len());
    for entity in entities {
        match by_id.entry(entity.id.clone()) {
            Entry::Occupied(mut slot) => {
                if entity.version >= slot.get().version {
                    slot.insert(entity);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
        }
    }
    by_id
}

fn should_replace(existing: &Entity, incoming: &Entity) -> bool {
    existing.version < incoming.version
        || (existing.version == incoming.version && existing.is_offline())
}

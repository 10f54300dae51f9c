use entities_core::db::open_db_in_memory;
use entities_core::{
    EntitiesRepository, EntitiesService, Entity, EntityState, InMemoryEntitiesRepository,
    SnapshotReport, SqliteEntitiesRepository,
};

fn server_entity(id: &str, label: &str, version: i64) -> Entity {
    let mut entity = Entity::new(id, label);
    entity.version = version;
    entity
}

#[test]
fn first_snapshot_adds_everything_online() {
    let service = EntitiesService::new(InMemoryEntitiesRepository::new());

    let report = service
        .apply_server_snapshot(
            "cases",
            "h1",
            vec![server_entity("a", "A", 1), server_entity("b", "B", 2)],
        )
        .unwrap();

    assert_eq!(
        report,
        SnapshotReport {
            added: 2,
            ..SnapshotReport::default()
        }
    );
    assert_eq!(service.count("cases").unwrap(), 2);
    let b = service.get_by_id("cases", "b").unwrap().unwrap();
    assert_eq!(b.entity.state, EntityState::Online);
    assert_eq!(b.entity.trunk_version, Some(2));
    assert_eq!(
        service.repository().get_list_hash("cases").unwrap().as_deref(),
        Some("h1")
    );
}

#[test]
fn matching_hash_skips_all_writes() {
    let service = EntitiesService::new(InMemoryEntitiesRepository::new());
    service
        .apply_server_snapshot("cases", "h1", vec![server_entity("a", "A", 1)])
        .unwrap();

    let report = service
        .apply_server_snapshot("cases", "h1", vec![server_entity("z", "Z", 9)])
        .unwrap();

    assert!(report.unchanged_list);
    assert!(service.get_by_id("cases", "z").unwrap().is_none());
    assert!(!service.needs_update("cases", "h1").unwrap());
    assert!(service.needs_update("cases", "h2").unwrap());
}

#[test]
fn changed_snapshot_reconciles_local_state() {
    let conn = open_db_in_memory().unwrap();
    let service = EntitiesService::new(SqliteEntitiesRepository::try_new(&conn).unwrap());

    service
        .apply_server_snapshot(
            "cases",
            "h1",
            vec![
                server_entity("stale", "Stale", 1),
                server_entity("gone", "Gone", 1),
                server_entity("ahead", "Ahead", 1),
                server_entity("same", "Same", 1),
            ],
        )
        .unwrap();

    // Local edits: one pending creation and one entity edited past the server.
    service.save("cases", &[Entity::new("pending", "Pending")]).unwrap();
    let mut ahead = service.get_by_id("cases", "ahead").unwrap().unwrap().entity;
    ahead.version = 5;
    ahead.label = Some("Ahead local".to_string());
    service.save("cases", &[ahead]).unwrap();

    let report = service
        .apply_server_snapshot(
            "cases",
            "h2",
            vec![
                server_entity("stale", "Stale v2", 2),
                server_entity("ahead", "Ahead server", 3),
                server_entity("same", "Same", 1),
                server_entity("fresh", "Fresh", 1),
            ],
        )
        .unwrap();

    assert_eq!(
        report,
        SnapshotReport {
            unchanged_list: false,
            added: 1,
            updated: 1,
            deleted: 1,
            unchanged: 3,
        }
    );

    let stale = service.get_by_id("cases", "stale").unwrap().unwrap();
    assert_eq!(stale.entity.label.as_deref(), Some("Stale v2"));
    assert_eq!(stale.entity.version, 2);
    assert!(service.get_by_id("cases", "gone").unwrap().is_none());
    assert_eq!(
        service
            .get_by_id("cases", "ahead")
            .unwrap()
            .unwrap()
            .entity
            .label
            .as_deref(),
        Some("Ahead local")
    );
    let pending = service.get_by_id("cases", "pending").unwrap().unwrap();
    assert_eq!(pending.entity.state, EntityState::Offline);
    assert!(service.get_by_id("cases", "fresh").unwrap().is_some());
    assert_eq!(service.count("cases").unwrap(), 5);
    assert_eq!(
        service.repository().get_list_hash("cases").unwrap().as_deref(),
        Some("h2")
    );
}

#[test]
fn offline_copy_is_confirmed_by_matching_server_version() {
    let service = EntitiesService::new(InMemoryEntitiesRepository::new());
    service.save("cases", &[Entity::new("a", "Local")]).unwrap();

    let report = service
        .apply_server_snapshot("cases", "h1", vec![server_entity("a", "Server", 1)])
        .unwrap();

    assert_eq!(report.updated, 1);
    let a = service.get_by_id("cases", "a").unwrap().unwrap();
    assert_eq!(a.entity.state, EntityState::Online);
    assert_eq!(a.index, 0);
}

#[test]
fn invalid_snapshot_keeps_previous_hash() {
    let service = EntitiesService::new(InMemoryEntitiesRepository::new());
    service
        .apply_server_snapshot("cases", "h1", vec![server_entity("a", "A", 1)])
        .unwrap();

    let result =
        service.apply_server_snapshot("cases", "h2", vec![server_entity("b", "B", 0)]);

    assert!(result.is_err());
    assert_eq!(
        service.repository().get_list_hash("cases").unwrap().as_deref(),
        Some("h1")
    );
    assert_eq!(service.lists().unwrap().len(), 1);
}

#[test]
fn repeated_server_ids_are_applied_once_with_highest_version() {
    let service = EntitiesService::new(InMemoryEntitiesRepository::new());

    let report = service
        .apply_server_snapshot(
            "cases",
            "h1",
            vec![server_entity("a", "A v3", 3), server_entity("a", "A v2", 2)],
        )
        .unwrap();

    assert_eq!(
        report,
        SnapshotReport {
            added: 1,
            ..SnapshotReport::default()
        }
    );
    assert_eq!(service.count("cases").unwrap(), 1);
    let stored = service.get_by_id("cases", "a").unwrap().unwrap();
    assert_eq!(stored.entity.version, 3);
    assert_eq!(stored.entity.label.as_deref(), Some("A v3"));
    assert_eq!(stored.entity.trunk_version, Some(3));
}

#[test]
fn repeated_server_ids_update_an_existing_entity_once() {
    let conn = open_db_in_memory().unwrap();
    let service = EntitiesService::new(SqliteEntitiesRepository::try_new(&conn).unwrap());
    service
        .apply_server_snapshot("cases", "h1", vec![server_entity("a", "A v1", 1)])
        .unwrap();

    let report = service
        .apply_server_snapshot(
            "cases",
            "h2",
            vec![
                server_entity("a", "A v4", 4),
                server_entity("a", "A v2", 2),
                server_entity("a", "A v1", 1),
            ],
        )
        .unwrap();

    assert_eq!(
        report,
        SnapshotReport {
            updated: 1,
            ..SnapshotReport::default()
        }
    );
    let stored = service.get_by_id("cases", "a").unwrap().unwrap();
    assert_eq!(stored.entity.version, 4);
    assert_eq!(stored.index, 0);
}

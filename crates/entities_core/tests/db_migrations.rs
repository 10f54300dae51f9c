use entities_core::db::migrations::latest_version;
use entities_core::db::{
    open_db, open_db_in_memory, open_db_with_timeout, open_existing_db, DbError,
    DEFAULT_BUSY_TIMEOUT,
};
use entities_core::StoreConfig;
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "entity_lists");
    assert_table_exists(&conn, "entities");
    assert_table_exists(&conn, "entity_properties");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entities.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db_with_timeout(&path, Duration::from_millis(250)).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "entities");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_existing_db_refuses_to_create_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.sqlite3");

    match open_existing_db(&missing, DEFAULT_BUSY_TIMEOUT) {
        Err(DbError::MissingDatabase(path)) => assert_eq!(path, missing),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected missing database error"),
    }
    assert!(!missing.exists());

    let present = dir.path().join("present.sqlite3");
    drop(open_db(&present).unwrap());
    let conn = open_existing_db(&present, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
}

#[test]
fn existing_older_schema_is_migrated_forward() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_entity_lists.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    drop(conn);

    let conn = open_existing_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "entity_properties");
}

#[test]
fn store_config_opens_file_or_memory_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.sqlite3");

    let config = StoreConfig {
        database_path: Some(path.clone()),
        ..StoreConfig::default()
    };
    let conn = config.open_db().unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert!(path.exists());

    let memory = StoreConfig::default().open_db().unwrap();
    assert_table_exists(&memory, "entity_lists");
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO entities (list_name, entity_id, version, branch_id, state, seq)
         VALUES ('missing', 'a', 1, 'b', 'offline', 1);",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

//! SQLite implementation of the entities repository.
//!
//! # Responsibility
//! - Persist entity lists, entities and properties in the migrated schema.
//! - Keep SQL details and ordering behavior inside the repository boundary.
//!
//! # Invariants
//! - Every write runs in one `IMMEDIATE` transaction, so concurrent writers
//!   on the same file are serialized by SQLite.
//! - `seq` is assigned on first insert and preserved on overwrite; indices
//!   are the dense `ROW_NUMBER()` over `seq`.
//! - Read paths reject invalid persisted rows instead of masking them.

use crate::db::migrations::{current_user_version, latest_version};
use crate::model::entity::{
    Entity, EntityState, SavedEntity, ID_COLUMN, LABEL_COLUMN, VERSION_COLUMN,
};
use crate::model::query::EntityQuery;
use crate::repo::entities_repo::{
    ensure_list_name, validate_batch, EntitiesRepository, RepoError, RepoResult,
};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeSet;
use std::time::Instant;

const ENTITY_COLUMNS: &str = "entity_id, label, version, trunk_version, branch_id, state";

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("entity_lists", &["name", "hash"]),
    (
        "entities",
        &[
            "list_name",
            "entity_id",
            "label",
            "version",
            "trunk_version",
            "branch_id",
            "state",
            "seq",
        ],
    ),
    (
        "entity_properties",
        &["list_name", "entity_id", "name", "value", "position"],
    ),
];

/// SQLite-backed entities repository.
pub struct SqliteEntitiesRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntitiesRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn write_transaction(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl EntitiesRepository for SqliteEntitiesRepository<'_> {
    fn save(&self, list: &str, entities: &[Entity]) -> RepoResult<()> {
        validate_batch(list, entities)?;
        let started_at = Instant::now();

        let tx = self.write_transaction()?;
        register_list(&tx, list)?;
        for entity in entities {
            upsert_entity(&tx, list, entity)?;
        }
        touch_list(&tx, list)?;
        tx.commit()?;

        debug!(
            "event=entities_save module=repo status=ok engine=sqlite list={} batch_size={} duration_ms={}",
            list,
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn get_lists(&self) -> RepoResult<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM entity_lists ORDER BY name ASC;")?;
        let mut rows = stmt.query([])?;
        let mut lists = BTreeSet::new();
        while let Some(row) = rows.next()? {
            lists.insert(row.get::<_, String>(0)?);
        }
        Ok(lists)
    }

    fn get_count(&self, list: &str) -> RepoResult<usize> {
        ensure_list_name(list)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE list_name = ?1;",
            [list],
            |row| row.get(0),
        )?;
        to_usize(count, "COUNT(entities)")
    }

    fn add_list(&self, list: &str) -> RepoResult<()> {
        ensure_list_name(list)?;
        register_list(self.conn, list)?;
        debug!("event=entities_add_list module=repo status=ok engine=sqlite list={list}");
        Ok(())
    }

    fn delete(&self, list: &str, id: &str) -> RepoResult<()> {
        ensure_list_name(list)?;

        let tx = self.write_transaction()?;
        tx.execute(
            "DELETE FROM entity_properties WHERE list_name = ?1 AND entity_id = ?2;",
            params![list, id],
        )?;
        let removed = tx.execute(
            "DELETE FROM entities WHERE list_name = ?1 AND entity_id = ?2;",
            params![list, id],
        )?;
        if removed > 0 {
            touch_list(&tx, list)?;
        }
        tx.commit()?;

        debug!(
            "event=entities_delete module=repo status=ok engine=sqlite list={} removed={}",
            list, removed
        );
        Ok(())
    }

    fn query(&self, list: &str, query: Option<&EntityQuery>) -> RepoResult<Vec<SavedEntity>> {
        ensure_list_name(list)?;

        let mut sql = format!(
            "WITH ranked AS (
                SELECT
                    list_name,
                    {ENTITY_COLUMNS},
                    ROW_NUMBER() OVER (ORDER BY seq ASC) - 1 AS entity_index
                FROM entities
                WHERE list_name = ?
            )
            SELECT {ENTITY_COLUMNS}, entity_index
            FROM ranked
            WHERE 1 = 1"
        );
        let mut bind_values: Vec<Value> = vec![Value::Text(list.to_string())];

        if let Some(query) = query {
            sql.push_str(" AND ");
            push_filter_sql(query, &mut sql, &mut bind_values);
        }
        sql.push_str(" ORDER BY entity_index ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut saved = Vec::new();
        while let Some(row) = rows.next()? {
            let index = to_usize(row.get("entity_index")?, "entity_index")?;
            let entity = parse_entity_row(self.conn, list, row)?;
            saved.push(SavedEntity { index, entity });
        }

        Ok(saved)
    }

    fn get_by_index(&self, list: &str, index: usize) -> RepoResult<Option<SavedEntity>> {
        ensure_list_name(list)?;
        let Ok(offset) = i64::try_from(index) else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS}
             FROM entities
             WHERE list_name = ?1
             ORDER BY seq ASC
             LIMIT 1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![list, offset])?;
        if let Some(row) = rows.next()? {
            let entity = parse_entity_row(self.conn, list, row)?;
            return Ok(Some(SavedEntity { index, entity }));
        }

        Ok(None)
    }

    fn update_list_hash(&self, list: &str, hash: &str) -> RepoResult<()> {
        ensure_list_name(list)?;
        self.conn.execute(
            "INSERT INTO entity_lists (name, hash) VALUES (?1, ?2)
             ON CONFLICT (name) DO UPDATE SET
                hash = excluded.hash,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![list, hash],
        )?;
        debug!("event=entities_update_hash module=repo status=ok engine=sqlite list={list}");
        Ok(())
    }

    fn get_list_hash(&self, list: &str) -> RepoResult<Option<String>> {
        ensure_list_name(list)?;
        let hash = self
            .conn
            .query_row(
                "SELECT hash FROM entity_lists WHERE name = ?1;",
                [list],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(hash.flatten())
    }
}

fn register_list(conn: &Connection, list: &str) -> RepoResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entity_lists (name) VALUES (?1);",
        [list],
    )?;
    Ok(())
}

fn touch_list(conn: &Connection, list: &str) -> RepoResult<()> {
    conn.execute(
        "UPDATE entity_lists
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE name = ?1;",
        [list],
    )?;
    Ok(())
}

fn upsert_entity(conn: &Connection, list: &str, entity: &Entity) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO entities (
            list_name,
            entity_id,
            label,
            version,
            trunk_version,
            branch_id,
            state,
            seq
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM entities WHERE list_name = ?1)
        )
        ON CONFLICT (list_name, entity_id) DO UPDATE SET
            label = excluded.label,
            version = excluded.version,
            trunk_version = excluded.trunk_version,
            branch_id = excluded.branch_id,
            state = excluded.state;",
        params![
            list,
            entity.id.as_str(),
            entity.label.as_deref(),
            entity.version,
            entity.trunk_version,
            entity.branch_id.as_str(),
            entity.state.as_str(),
        ],
    )?;

    conn.execute(
        "DELETE FROM entity_properties WHERE list_name = ?1 AND entity_id = ?2;",
        params![list, entity.id.as_str()],
    )?;
    for (position, (name, value)) in entity.properties.iter().enumerate() {
        conn.execute(
            "INSERT INTO entity_properties (list_name, entity_id, name, value, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![list, entity.id.as_str(), name, value, position as i64],
        )?;
    }

    Ok(())
}

fn push_filter_sql(query: &EntityQuery, sql: &mut String, bind_values: &mut Vec<Value>) {
    match query {
        EntityQuery::Eq { column, value } => {
            push_column_sql(column, sql, bind_values);
            sql.push_str(" = ?");
            bind_values.push(Value::Text(value.clone()));
        }
        EntityQuery::NotEq { column, value } => {
            push_column_sql(column, sql, bind_values);
            sql.push_str(" <> ?");
            bind_values.push(Value::Text(value.clone()));
        }
        EntityQuery::And(left, right) => push_compound_sql("AND", left, right, sql, bind_values),
        EntityQuery::Or(left, right) => push_compound_sql("OR", left, right, sql, bind_values),
    }
}

fn push_compound_sql(
    operator: &str,
    left: &EntityQuery,
    right: &EntityQuery,
    sql: &mut String,
    bind_values: &mut Vec<Value>,
) {
    sql.push('(');
    push_filter_sql(left, sql, bind_values);
    sql.push(' ');
    sql.push_str(operator);
    sql.push(' ');
    push_filter_sql(right, sql, bind_values);
    sql.push(')');
}

// Mirrors `Entity::column_value` so both engines resolve columns identically.
fn push_column_sql(column: &str, sql: &mut String, bind_values: &mut Vec<Value>) {
    match column {
        ID_COLUMN => sql.push_str("ranked.entity_id"),
        LABEL_COLUMN => sql.push_str("COALESCE(ranked.label, '')"),
        VERSION_COLUMN => sql.push_str("CAST(ranked.version AS TEXT)"),
        property => {
            sql.push_str(
                "COALESCE((
                    SELECT p.value
                    FROM entity_properties p
                    WHERE p.list_name = ranked.list_name
                      AND p.entity_id = ranked.entity_id
                      AND p.name = ?
                ), '')",
            );
            bind_values.push(Value::Text(property.to_string()));
        }
    }
}

fn parse_entity_row(conn: &Connection, list: &str, row: &Row<'_>) -> RepoResult<Entity> {
    let id: String = row.get("entity_id")?;
    let state_text: String = row.get("state")?;
    let state = EntityState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid state `{state_text}` in entities.state"))
    })?;

    let properties = load_properties(conn, list, &id)?;
    let entity = Entity {
        id,
        label: row.get("label")?,
        version: row.get("version")?,
        properties,
        state,
        trunk_version: row.get("trunk_version")?,
        branch_id: row.get("branch_id")?,
    };
    entity
        .validate()
        .map_err(|err| RepoError::InvalidData(err.to_string()))?;
    Ok(entity)
}

fn load_properties(conn: &Connection, list: &str, id: &str) -> RepoResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, value
         FROM entity_properties
         WHERE list_name = ?1 AND entity_id = ?2
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query(params![list, id])?;
    let mut properties = Vec::new();
    while let Some(row) = rows.next()? {
        properties.push((row.get(0)?, row.get(1)?));
    }
    Ok(properties)
}

fn to_usize(value: i64, column: &str) -> RepoResult<usize> {
    usize::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid {column} value `{value}`")))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

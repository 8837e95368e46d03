//! Database schema and operations

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::StoreError;
use crate::models::{ItemKind, Recipe, RequirementLine};
use crate::store::KeyValueStore;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Recipe catalog, one row per craftable item
        CREATE TABLE IF NOT EXISTS recipes (
            name TEXT PRIMARY KEY,
            base_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            requirements_json TEXT NOT NULL
        );

        -- Persistent key-value data (owned quantities, active projects)
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_kind ON recipes(kind);
        "#,
    )?;
    Ok(())
}

/// Insert or replace a recipe
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO recipes (name, base_name, kind, requirements_json)
         VALUES (?1, ?2, ?3, ?4)",
        (
            &recipe.name,
            &recipe.base_name,
            recipe.kind.as_str(),
            serde_json::to_string(&recipe.requirements)?,
        ),
    )?;
    Ok(())
}

/// Clear the recipe catalog (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM recipes;")?;
    Ok(())
}

/// Load every recipe in the catalog, sorted by name
pub fn load_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut stmt = conn.prepare(
        "SELECT name, base_name, kind, requirements_json FROM recipes ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (name, base_name, kind, requirements_json) = row?;
        let kind = ItemKind::parse(&kind)
            .with_context(|| format!("recipe '{}' has unknown kind '{}'", name, kind))?;
        let requirements: Vec<RequirementLine> = serde_json::from_str(&requirements_json)
            .with_context(|| format!("recipe '{}' has malformed requirements", name))?;
        results.push(Recipe {
            name,
            base_name,
            kind,
            requirements,
        });
    }
    Ok(results)
}

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Connection,
    data_version: i64,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed opening database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let data_version = read_data_version(&conn)?;
        Ok(Self { conn, data_version })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Lock contention from another process is reported as unavailability
fn write_error(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Sqlite(e),
    }
}

/// `PRAGMA data_version` changes when another connection commits
fn read_data_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(write_error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(write_error)?;
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![prefix, prefix.chars().count() as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn external_change(&mut self) -> Result<bool, StoreError> {
        let current = read_data_version(&self.conn)?;
        let changed = current != self.data_version;
        self.data_version = current;
        Ok(changed)
    }
}

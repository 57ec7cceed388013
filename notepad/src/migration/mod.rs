use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

/// One forward step of the notes schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    sql: &'static str,
}

impl Migration {
    /// Human-readable description of this migration.
    pub fn describe(&self) -> String {
        format!("v{}: {}", self.version, self.description)
    }
}

/// Every known migration, oldest first. Append only.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create notes table",
        sql: "
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY,
                title TEXT,
                body TEXT,
                created INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                color INTEGER
            );
        ",
    },
    Migration {
        version: 2,
        description: "add category column, backfilled as 'task'",
        sql: "
            ALTER TABLE notes ADD COLUMN category TEXT;
            UPDATE notes SET category = 'task' WHERE category IS NULL;
        ",
    },
];

/// Newest schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// The migrations that would run against a database at `current`.
pub fn pending_migrations(current: u32) -> Result<Vec<Migration>> {
    if current > latest_version() {
        return Err(StoreError::Migration(format!(
            "database is at version {current}, newer than the latest known version {}",
            latest_version()
        )));
    }
    Ok(MIGRATIONS
        .iter()
        .filter(|m| m.version > current)
        .copied()
        .collect())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Version of the database file at `path` without migrating it. A missing
/// file is version 0.
pub fn version_at(path: &Path) -> Result<u32> {
    if !path.exists() {
        return Ok(0);
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    current_version(&conn)
}

/// Bring the database up to the latest version. Each migration commits on
/// its own, so a failure leaves the database at the last good version.
pub fn migrate(conn: &mut Connection) -> Result<Vec<Migration>> {
    // Refuse a newer database before writing anything to it
    let pending = pending_migrations(current_version(conn)?)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    for migration in &pending {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;
        // PRAGMA does not take bound parameters
        tx.execute_batch(&format!("PRAGMA user_version = {}", migration.version))?;
        tx.commit()?;
        log::info!("Applied migration {}", migration.describe());
    }
    Ok(pending)
}

/// Applied migrations as recorded in the history table, oldest first.
pub fn history(conn: &Connection) -> Result<Vec<(u32, String)>> {
    let mut stmt =
        conn.prepare("SELECT version, description FROM migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

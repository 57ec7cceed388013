use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::migration;
use crate::query::{ReadQuery, WriteScope};
use crate::record::Row;
use crate::schema::{columns, TABLE_NAME};
use crate::validation::PreparedValues;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Read/write counters of a [`NotesDb`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbStats {
    pub reads: u64,
    pub writes: u64,
}

/// The notes table behind a single serialized connection.
pub struct NotesDb {
    conn: Mutex<Connection>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl NotesDb {
    /// Open or create the database at the given path and migrate it.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let db = Self::initialize(conn)?;
        // Only switch journal mode once the schema is known to be ours
        db.conn()?.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(db)
    }

    /// Open a private in-memory database (tests, scratch stores).
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.database_path() {
            Some(path) => Self::open(&path, config.busy_timeout()),
            None => Self::open_in_memory(),
        }
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        let applied = migration::migrate(&mut conn)?;
        if !applied.is_empty() {
            log::info!("Notes database migrated to v{}", migration::latest_version());
        }
        Ok(NotesDb {
            conn: Mutex::new(conn),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Runtime("notes database lock poisoned".to_string()))
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        migration::current_version(&conn)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Run a built read and collect its rows under the projection's names.
    pub fn select(&self, query: &ReadQuery) -> Result<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let names: Arc<[String]> = query.column_names().into();
        let width = names.len();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query.sql)?;
        let mut rows = stmt.query(params_from_iter(query.params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(to_json(row.get_ref(i)?));
            }
            result.push(Row::new(names.clone(), values));
        }
        Ok(result)
    }

    pub fn count(&self) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Insert a prepared row and return its new id.
    pub fn insert(&self, values: &PreparedValues) -> Result<i64> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let names: Vec<&str> = values.keys().copied().collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {TABLE_NAME} ({}) VALUES ({placeholders})",
            names.join(", ")
        );

        let conn = self.conn()?;
        let inserted = conn.execute(&sql, params_from_iter(values.values()))?;
        if inserted != 1 {
            return Err(StoreError::InsertFailed(TABLE_NAME.to_string()));
        }
        Ok(conn.last_insert_rowid())
    }

    /// Update the rows in `scope`. `modified` is never allowed to fall
    /// behind a row's `created`.
    pub fn update(&self, values: &PreparedValues, scope: &WriteScope) -> Result<usize> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if values.is_empty() {
            return Ok(0);
        }
        let assignments = values
            .keys()
            .map(|column| {
                if *column == columns::MODIFIED {
                    format!("{column} = MAX({}, ?)", columns::CREATED)
                } else {
                    format!("{column} = ?")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {TABLE_NAME} SET {assignments}");
        push_where(&mut sql, scope);

        let params: Vec<&SqlValue> = values.values().chain(scope.params.iter()).collect();
        let conn = self.conn()?;
        Ok(conn.execute(&sql, params_from_iter(params))?)
    }

    pub fn delete(&self, scope: &WriteScope) -> Result<usize> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut sql = format!("DELETE FROM {TABLE_NAME}");
        push_where(&mut sql, scope);
        let conn = self.conn()?;
        Ok(conn.execute(&sql, params_from_iter(scope.params.iter()))?)
    }
}

fn push_where(sql: &mut String, scope: &WriteScope) {
    if let Some(clause) = &scope.clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

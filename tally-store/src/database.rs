//! SQLite connection management and schema migrations.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};
use tally_core::{Result, SuggestError};
use tracing::debug;

/// Each entry upgrades the schema by one `user_version`.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS budget_categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        budget_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        sort_order INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS idx_category_budget
        ON budget_categories(budget_id, is_active);

    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        budget_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        amount_cents INTEGER NOT NULL,
        date TEXT NOT NULL,
        notes TEXT,
        is_split INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_txn_user_category ON transactions(user_id, category_id);
    CREATE INDEX IF NOT EXISTS idx_txn_user_amount ON transactions(user_id, amount_cents);

    CREATE TABLE IF NOT EXISTS category_patterns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        pattern_text TEXT NOT NULL,
        confidence_score REAL NOT NULL
            CHECK (confidence_score >= 0.1 AND confidence_score <= 1.0),
        usage_count INTEGER NOT NULL DEFAULT 1 CHECK (usage_count >= 1),
        last_used TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pattern_user_text ON category_patterns(user_id, pattern_text);
    CREATE INDEX IF NOT EXISTS idx_pattern_user_category ON category_patterns(user_id, category_id);
    CREATE INDEX IF NOT EXISTS idx_pattern_last_used ON category_patterns(last_used DESC);

    CREATE TABLE IF NOT EXISTS category_suggestion_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        transaction_id INTEGER,
        suggested_category_id INTEGER NOT NULL,
        actual_category_id INTEGER NOT NULL,
        pattern_text TEXT NOT NULL,
        was_accepted INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_suggestion_log_user
        ON category_suggestion_logs(user_id, created_at);
    "#,
];

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a SQLite failure onto the core's storage conditions.
pub(crate) fn map_db_error(err: rusqlite::Error) -> SuggestError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
        _ => None,
    };
    match code {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::FileLockingProtocolFailed,
        ) => SuggestError::StorageUnavailable(err.to_string()),
        Some(ErrorCode::ConstraintViolation) => {
            SuggestError::StorageConstraintViolation(err.to_string())
        }
        _ => SuggestError::Storage(err.to_string()),
    }
}

/// Fixed-width UTC timestamps, so text comparison orders them correctly.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// SQLite-backed store. Cloning shares the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at `path`, creating parent directories.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SuggestError::StorageUnavailable(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(map_db_error)?;
        debug!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(map_db_error)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(map_db_error)?;
        migrate(&conn).map_err(map_db_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive use of the connection, mapping SQLite errors.
    pub(crate) fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| SuggestError::StorageUnavailable("database lock poisoned".to_string()))?;
        f(&mut *conn).map_err(map_db_error)
    }

    pub fn schema_version(&self) -> Result<i32> {
        self.with_conn(|conn| conn.pragma_query_value(None, "user_version", |row| row.get(0)))
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = MIGRATIONS.len() as i32;

    for (version, sql) in MIGRATIONS.iter().enumerate().skip(current.max(0) as usize) {
        debug!(version = version + 1, "applying schema migration");
        conn.execute_batch(sql)?;
    }
    if current < target {
        conn.pragma_update(None, "user_version", target)?;
    }
    Ok(())
}

//! SQLite visit store
//!
//! Persists one row per foreground-resource observation in the
//! `resource_application` table. Connections come from a deadpool-sqlite
//! pool; every query runs inside `interact` so blocking SQLite calls stay
//! off the async executor.

use crate::error::{AnamnesisError, Result};
use crate::storage::VisitStore;
use crate::types::ResourceVisit;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use std::path::Path;
use tracing::{debug, info};

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS resource_application (
        id INTEGER PRIMARY KEY,
        time TEXT NOT NULL,
        path TEXT NOT NULL,
        process TEXT NOT NULL,
        window TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX IF NOT EXISTS idx_resource_application_time
        ON resource_application (time, id);
";

/// Visit store backed by a SQLite database file
pub struct SqliteVisitStore {
    pool: Pool,
}

impl SqliteVisitStore {
    /// Open (creating if needed) the visit database and its table
    ///
    /// # Example
    /// ```ignore
    /// let store = SqliteVisitStore::open("visits.db").await?;
    /// ```
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!("Opening visit store at: {}", path_str);

        let config = Config::new(path_str);
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            AnamnesisError::Database(format!("Failed to create connection pool: {}", e))
        })?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Create the visit table if it does not exist (safe to call repeatedly)
    pub async fn create_tables(&self) -> Result<()> {
        self.interact(|conn| conn.execute_batch(CREATE_TABLE_SQL))
            .await?;
        debug!("Visit table ready");
        Ok(())
    }

    async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            AnamnesisError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(f)
            .await
            .map_err(|e| AnamnesisError::Database(format!("Pool interaction failed: {}", e)))?
            .map_err(AnamnesisError::from)
    }
}

fn format_time(timestamp: &DateTime<Utc>) -> String {
    // Fixed width so lexical order equals chronological order
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[async_trait]
impl VisitStore for SqliteVisitStore {
    async fn fetch_ordered_visits(&self) -> Result<Vec<ResourceVisit>> {
        let visits = self
            .interact(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT time, path, process, window FROM resource_application
                     ORDER BY time ASC, id ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    let time: String = row.get(0)?;
                    Ok(ResourceVisit {
                        timestamp: parse_time(&time)?,
                        path: row.get(1)?,
                        process: row.get(2)?,
                        window_title: row.get(3)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        debug!("Fetched {} visits", visits.len());
        Ok(visits)
    }

    async fn save_visit(&self, visit: &ResourceVisit) -> Result<()> {
        let time = format_time(&visit.timestamp);
        let path = visit.path.clone();
        let process = visit.process.clone();
        let window = visit.window_title.clone();

        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO resource_application (time, path, process, window)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![time, path, process, window],
            )
        })
        .await?;

        debug!("Saved visit: {} ({})", visit.path, visit.process);
        Ok(())
    }

    async fn recently_used(&self, limit: usize) -> Result<Vec<String>> {
        let limit = limit as i64;
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path, MAX(time) AS last_seen FROM resource_application
                 WHERE TRIM(path, char(32, 9, 10, 13)) != ''
                 GROUP BY path
                 ORDER BY last_seen DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![limit], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }
}

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use model::{ChartSnapshot, ChartSummary, Mark, NewMark, NewSnapshot};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: &[&str] = &["marks", "charts"];

const MEMORY_PREFIX: &str = "sqlite::memory:";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Pool exhausted, connection lost, or the database is locked.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate record")]
    Duplicate,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            // SQLITE_BUSY / SQLITE_LOCKED
            sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("5") | Some("6")) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    /// Bound on establishing or borrowing a pooled connection.
    pub connect_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Row-level access to chart marks. Idempotent create and retry live above this.
#[async_trait]
pub trait MarkStore: Send + Sync {
    async fn find_mark(&self, symbol: &str, timestamp: i64) -> Result<Option<Mark>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when (symbol, timestamp) exists.
    async fn insert_mark(&self, mark: &NewMark) -> Result<Mark, StoreError>;

    /// Ascending by timestamp.
    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<u64, StoreError>;

    async fn delete_marks(&self, symbol: &str) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ChartStore: Send + Sync {
    async fn insert_chart(&self, snapshot: &NewSnapshot) -> Result<ChartSnapshot, StoreError>;

    /// Newest first.
    async fn list_charts(&self) -> Result<Vec<(String, ChartSummary)>, StoreError>;

    async fn get_chart(&self, id: &str) -> Result<Option<ChartSnapshot>, StoreError>;
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with(url, &StoreOptions::default()).await
    }

    pub async fn connect_with(url: &str, options: &StoreOptions) -> Result<Self, StoreError> {
        let connect = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(options.connect_timeout);

        let pool_options = SqlitePoolOptions::new().acquire_timeout(options.connect_timeout);
        // Every in-memory connection is its own database, so keep exactly one alive.
        let pool_options = if url.starts_with(MEMORY_PREFIX) {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(options.max_connections.max(1))
        };

        let pool = pool_options.connect_with(connect).await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Names from [`REQUIRED_TABLES`] that are absent from the schema.
    pub async fn validate_required_tables(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await?;
        let mut present = Vec::with_capacity(rows.len());
        for row in rows {
            present.push(row.try_get::<String, _>("name")?);
        }
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|name| name == *table))
            .map(|table| table.to_string())
            .collect())
    }
}

#[async_trait]
impl MarkStore for Store {
    async fn find_mark(&self, symbol: &str, timestamp: i64) -> Result<Option<Mark>, StoreError> {
        let row = sqlx::query(
            "SELECT id, symbol, timestamp_ms, date, created_at_ms FROM marks WHERE symbol = ?1 AND timestamp_ms = ?2",
        )
        .bind(symbol)
        .bind(timestamp)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(mark_from_row).transpose()
    }

    async fn insert_mark(&self, mark: &NewMark) -> Result<Mark, StoreError> {
        let created_at_ms = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO marks (symbol, timestamp_ms, date, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&mark.symbol)
        .bind(mark.timestamp)
        .bind(&mark.date)
        .bind(created_at_ms)
        .execute(&self.pool)
        .await?;
        debug!(symbol = %mark.symbol, timestamp = mark.timestamp, "mark inserted");
        Ok(Mark {
            id: result.last_insert_rowid(),
            symbol: mark.symbol.clone(),
            timestamp: mark.timestamp,
            date: mark.date.clone(),
            created_at: from_millis(created_at_ms)?,
        })
    }

    async fn list_marks(&self, symbol: &str) -> Result<Vec<Mark>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, symbol, timestamp_ms, date, created_at_ms FROM marks WHERE symbol = ?1 ORDER BY timestamp_ms ASC",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mark_from_row).collect()
    }

    async fn delete_mark(&self, symbol: &str, timestamp: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM marks WHERE symbol = ?1 AND timestamp_ms = ?2")
            .bind(symbol)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_marks(&self, symbol: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM marks WHERE symbol = ?1")
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChartStore for Store {
    async fn insert_chart(&self, snapshot: &NewSnapshot) -> Result<ChartSnapshot, StoreError> {
        let id = Uuid::new_v4().to_string();
        let saved_at_ms = Utc::now().timestamp_millis();
        let state_json = serde_json::to_string(&snapshot.state)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO charts (chart_id, title, state_json, saved_at_ms) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(&snapshot.title)
        .bind(&state_json)
        .bind(saved_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(ChartSnapshot {
            id,
            title: snapshot.title.clone(),
            state: snapshot.state.clone(),
            saved_at: from_millis(saved_at_ms)?,
        })
    }

    async fn list_charts(&self) -> Result<Vec<(String, ChartSummary)>, StoreError> {
        let rows = sqlx::query(
            "SELECT chart_id, title, saved_at_ms FROM charts ORDER BY saved_at_ms DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<(String, ChartSummary), StoreError> {
                let id: String = row.try_get("chart_id")?;
                let summary = ChartSummary {
                    title: row.try_get("title")?,
                    saved_at: from_millis(row.try_get("saved_at_ms")?)?,
                };
                Ok((id, summary))
            })
            .collect()
    }

    async fn get_chart(&self, id: &str) -> Result<Option<ChartSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT chart_id, title, state_json, saved_at_ms FROM charts WHERE chart_id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let state_json: String = row.try_get("state_json")?;
        let state = serde_json::from_str(&state_json)
            .map_err(|err| StoreError::Corrupt(format!("chart {id}: {err}")))?;
        Ok(Some(ChartSnapshot {
            id: row.try_get("chart_id")?,
            title: row.try_get("title")?,
            state,
            saved_at: from_millis(row.try_get("saved_at_ms")?)?,
        }))
    }
}

fn mark_from_row(row: &SqliteRow) -> Result<Mark, StoreError> {
    Ok(Mark {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        timestamp: row.try_get("timestamp_ms")?,
        date: row.try_get("date")?,
        created_at: from_millis(row.try_get("created_at_ms")?)?,
    })
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {ms} out of range")))
}

pub async fn init_sqlite(url: &str, options: &StoreOptions) -> Result<Store, StoreError> {
    let store = Store::connect_with(url, options).await?;
    info!(
        path = url,
        max_connections = options.max_connections,
        connect_timeout_ms = options.connect_timeout.as_millis() as u64,
        "sqlite initialized"
    );
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}

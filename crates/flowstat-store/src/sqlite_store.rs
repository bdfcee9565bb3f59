//! SQLite-based durable status store
//!
//! Executions and events live in two tables so the event log grows without
//! rewriting the execution row on every append. Table names come from
//! configuration. Every write is awaited; nothing is batched.

use crate::error::{Result, StoreError};
use crate::metrics::{self, OperationTimer};
use crate::status_store::{page_window, StatusStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowstat_core::{
    ExecutionRecord, ExecutionStatus, Message, SqliteSettings, StatusEvent,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const BACKEND: &str = "sqlite";

/// How long a writer waits for the database lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const EXEC_COLUMNS: &str =
    "execution_id, app_name, request_id, start_time, end_time, status, error, result_role, result_content";

const EVENT_COLUMNS: &str =
    "execution_id, type, timestamp_ms, node_key, node_type, status, error, app_name, request_id, data_flow, control_flow";

/// SQLite-backed store for execution records and status events
pub struct SqliteStore {
    pool: SqlitePool,
    exec_table: String,
    status_table: String,
}

impl SqliteStore {
    /// Connect and create the schema if needed.
    ///
    /// URL format: `sqlite:///path/to/status.db` or `sqlite::memory:`
    pub async fn connect(settings: &SqliteSettings) -> Result<Self> {
        settings.validate()?;
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| flowstat_core::ConfigError::missing("status.store.sqlite.url"))?;
        info!("Initializing SQLite status store: {}", url);

        // Every connection to `:memory:` is its own database; pin a single one.
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            // Readers no longer block the single writer
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(settings.max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        let store = Self {
            pool,
            exec_table: settings.exec_table.clone(),
            status_table: settings.status_table.clone(),
        };
        store.initialize_schema().await?;
        metrics::register_metrics();

        info!(
            exec_table = %store.exec_table,
            status_table = %store.status_table,
            "SQLite status store initialized"
        );
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&SqliteSettings::with_url("sqlite::memory:")).await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing status store schema");

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {exec} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL UNIQUE,
                app_name TEXT NOT NULL,
                request_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL,
                error TEXT,
                result_role TEXT,
                result_content TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            exec = self.exec_table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {status} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL,
                type TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                node_key TEXT,
                node_type TEXT,
                status TEXT NOT NULL,
                error TEXT,
                app_name TEXT NOT NULL,
                request_id TEXT NOT NULL,
                data_flow TEXT,
                control_flow TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            status = self.status_table
        ))
        .execute(&self.pool)
        .await?;

        for statement in [
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{t}_app ON {t}(app_name)",
                t = self.exec_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{t}_request ON {t}(request_id)",
                t = self.exec_table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{t}_execution ON {t}(execution_id)",
                t = self.status_table
            ),
        ] {
            sqlx::query(&statement).execute(&self.pool).await?;
        }

        debug!("Status store schema initialized");
        Ok(())
    }

    async fn load_history(&self, execution_id: &str) -> Result<Vec<StatusEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM {} WHERE execution_id = ? ORDER BY id ASC",
            self.status_table
        ))
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    fn track<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            metrics::record_store_error(operation, BACKEND);
            warn!(operation, error = %e, "SQLite status store operation failed");
        }
        result
    }

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO {} (execution_id, app_name, request_id, start_time, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            self.exec_table
        ))
        .bind(&record.execution_id)
        .bind(&record.app_name)
        .bind(&record.request_id)
        .bind(record.start_time.to_rfc3339())
        .bind(record.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::AlreadyExists(record.execution_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn append_event(&self, execution_id: &str, event: &StatusEvent) -> Result<bool> {
        let data_flow = event
            .data_flow
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let control_flow = event
            .control_flow
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        // Write first: a read-then-write transaction cannot wait for the lock.
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO {status} (execution_id, type, timestamp_ms, node_key, node_type, status,
                                  error, app_name, request_id, data_flow, control_flow, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM {exec} WHERE execution_id = ?)
            "#,
            status = self.status_table,
            exec = self.exec_table
        ))
        .bind(execution_id)
        .bind(event.event_type.as_str())
        .bind(event.timestamp)
        .bind(&event.node_key)
        .bind(&event.node_type)
        .bind(event.status.as_str())
        .bind(&event.error)
        .bind(&event.app_name)
        .bind(&event.request_id)
        .bind(&data_flow)
        .bind(&control_flow)
        .bind(&now)
        .bind(execution_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            metrics::record_event_rejected();
            return Ok(false);
        }

        let mut finished = None;
        if event.is_complete() {
            let (status, error) = match event.status {
                flowstat_core::EventStatus::Error => (
                    ExecutionStatus::Failed,
                    Some(event.error.clone().unwrap_or_default()),
                ),
                _ => (ExecutionStatus::Completed, None),
            };
            // Terminal rows are never rewritten by a repeated `complete`.
            let updated = sqlx::query(&format!(
                r#"
                UPDATE {} SET status = ?, error = ?, end_time = ?, updated_at = ?
                WHERE execution_id = ? AND status = ?
                "#,
                self.exec_table
            ))
            .bind(status.as_str())
            .bind(&error)
            .bind(&now)
            .bind(&now)
            .bind(execution_id)
            .bind(ExecutionStatus::Running.as_str())
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() > 0 {
                finished = Some(status);
            }
        }

        tx.commit().await?;

        metrics::record_event_appended(event.event_type.as_str());
        if let Some(status) = finished {
            metrics::record_execution_finished(status.as_str());
            debug!(execution_id = %execution_id, status = %status, "Execution finished");
        }
        Ok(true)
    }

    async fn fetch_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {EXEC_COLUMNS} FROM {} WHERE execution_id = ?",
            self.exec_table
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut record = record_from_row(&row)?;
                record.status_history = self.load_history(execution_id).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn update_result(&self, execution_id: &str, result: &Message) -> Result<bool> {
        let updated = sqlx::query(&format!(
            "UPDATE {} SET result_role = ?, result_content = ?, updated_at = ? WHERE execution_id = ?",
            self.exec_table
        ))
        .bind(&result.role)
        .bind(&result.content)
        .bind(Utc::now().to_rfc3339())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    async fn fetch_page(&self, page: usize, page_size: usize) -> Result<(Vec<ExecutionRecord>, usize)> {
        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM {}", self.exec_table))
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let (offset, limit) = page_window(page, page_size);
        let rows = sqlx::query(&format!(
            "SELECT {EXEC_COLUMNS} FROM {} ORDER BY id ASC LIMIT ? OFFSET ?",
            self.exec_table
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;
        Ok((records, usize::try_from(total).unwrap_or_default()))
    }
}

#[async_trait]
impl StatusStore for SqliteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(store = BACKEND))]
    async fn create_execution(
        &self,
        execution_id: &str,
        app_name: &str,
        request_id: &str,
    ) -> Result<ExecutionRecord> {
        let _timer = OperationTimer::new("create_execution", BACKEND);
        let record = ExecutionRecord::new(execution_id, app_name, request_id);
        let inserted = self.insert_execution(&record).await;
        self.track("create_execution", inserted)?;
        metrics::record_execution_created();
        Ok(record)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        let _timer = OperationTimer::new("get_execution", BACKEND);
        let fetched = self.fetch_execution(execution_id).await;
        self.track("get_execution", fetched)
    }

    #[instrument(skip(self, event), fields(store = BACKEND, event_type = %event.event_type))]
    async fn add_status(&self, execution_id: &str, event: &StatusEvent) -> Result<bool> {
        let _timer = OperationTimer::new("add_status", BACKEND);
        let appended = self.append_event(execution_id, event).await;
        self.track("add_status", appended)
    }

    async fn set_result(&self, execution_id: &str, result: &Message) -> Result<bool> {
        let _timer = OperationTimer::new("set_result", BACKEND);
        let updated = self.update_result(execution_id, result).await;
        self.track("set_result", updated)
    }

    async fn list_executions(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<ExecutionRecord>, usize)> {
        let _timer = OperationTimer::new("list_executions", BACKEND);
        let listed = self.fetch_page(page, page_size).await;
        self.track("list_executions", listed)
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn record_from_row(row: &SqliteRow) -> Result<ExecutionRecord> {
    let start_time: String = row.get("start_time");
    let end_time: Option<String> = row.get("end_time");
    let status: String = row.get("status");
    let result_role: Option<String> = row.get("result_role");
    let result_content: Option<String> = row.get("result_content");

    let result = match (result_role, result_content) {
        (None, None) => None,
        (role, content) => Some(Message {
            role: role.unwrap_or_default(),
            content: content.unwrap_or_default(),
        }),
    };

    Ok(ExecutionRecord {
        execution_id: row.get("execution_id"),
        app_name: row.get("app_name"),
        request_id: row.get("request_id"),
        start_time: parse_time(&start_time)?,
        end_time: end_time.as_deref().map(parse_time).transpose()?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        status_history: Vec::new(),
        result,
        error: row.get("error"),
    })
}

fn event_from_row(row: &SqliteRow) -> Result<StatusEvent> {
    let event_type: String = row.get("type");
    let status: String = row.get("status");
    let data_flow: Option<String> = row.get("data_flow");
    let control_flow: Option<String> = row.get("control_flow");

    Ok(StatusEvent {
        event_type: event_type.parse().map_err(StoreError::Corrupt)?,
        timestamp: row.get("timestamp_ms"),
        execution_id: row.get("execution_id"),
        node_key: row.get("node_key"),
        node_type: row.get("node_type"),
        status: status.parse().map_err(StoreError::Corrupt)?,
        error: row.get("error"),
        data_flow: data_flow.map(|s| serde_json::from_str(&s)).transpose()?,
        control_flow: control_flow.map(|s| serde_json::from_str(&s)).transpose()?,
        app_name: row.get("app_name"),
        request_id: row.get("request_id"),
    })
}

//! Database operations for execution history

use crate::error::{HistoryError, HistoryResult};
use crate::records::{DailyStats, ExecutionRecord, ExecutionStats, Page, RecordPage};
use crate::schema;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lynx_common::{CallerId, DocumentId, ExecutionOutcome, HistorySink};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const RECORD_COLUMNS: &str =
    "id, caller_id, document_id, success, output, error, failure, duration_ms, created_at";

const STATS_COLUMNS: &str = "COUNT(*) AS total,
    COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0) AS successful,
    COALESCE(SUM(CASE WHEN success THEN 0 ELSE 1 END), 0) AS failed,
    AVG(duration_ms) AS avg_duration_ms,
    MIN(duration_ms) AS min_duration_ms,
    MAX(duration_ms) AS max_duration_ms,
    COUNT(DISTINCT document_id) AS distinct_documents,
    MAX(created_at) AS last_executed";

/// Execution history backed by SQLite.
///
/// Every read and delete takes the caller id and filters on it, so one
/// caller can never observe or remove another caller's records.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        info!(path = %path.display(), "Opened history database");
        Self::with_pool(pool).await
    }

    /// Connect using a `sqlite:` URL
    pub async fn connect(database_url: &str) -> HistoryResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> HistoryResult<Self> {
        // each connection to :memory: is its own database, so keep exactly one alive
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> HistoryResult<Self> {
        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store one execution and return its record id
    pub async fn record(
        &self,
        caller: &CallerId,
        document: Option<&DocumentId>,
        outcome: &ExecutionOutcome,
        duration_ms: u64,
    ) -> HistoryResult<String> {
        self.insert(caller, document, outcome, duration_ms, Utc::now())
            .await
    }

    async fn insert(
        &self,
        caller: &CallerId,
        document: Option<&DocumentId>,
        outcome: &ExecutionOutcome,
        duration_ms: u64,
        created_at: DateTime<Utc>,
    ) -> HistoryResult<String> {
        let id = Uuid::new_v4().to_string();
        let duration_ms = i64::try_from(duration_ms).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO execution_history (id, caller_id, document_id, success, output, error, failure, duration_ms, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(caller.as_str())
        .bind(document.map(DocumentId::as_str))
        .bind(outcome.success)
        .bind(&outcome.output)
        .bind(outcome.error.as_deref())
        .bind(outcome.failure.map(|kind| kind.as_str()))
        .bind(duration_ms)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        debug!(record = %id, caller = %caller, success = outcome.success, "Recorded execution");
        Ok(id)
    }

    /// Most recent executions by this caller across all documents
    pub async fn list_for_caller(&self, caller: &CallerId, page: Page) -> HistoryResult<RecordPage> {
        check_page(&page)?;
        let records = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM execution_history WHERE caller_id = ? ORDER BY created_at DESC, seq DESC LIMIT ? OFFSET ?"
        ))
        .bind(caller.as_str())
        .bind(page.clamped_limit())
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM execution_history WHERE caller_id = ?")
                .bind(caller.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(RecordPage { records, total })
    }

    /// Most recent executions of one document by this caller
    pub async fn list_for_document(
        &self,
        caller: &CallerId,
        document: &DocumentId,
        page: Page,
    ) -> HistoryResult<RecordPage> {
        check_page(&page)?;
        let records = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM execution_history WHERE caller_id = ? AND document_id = ? ORDER BY created_at DESC, seq DESC LIMIT ? OFFSET ?"
        ))
        .bind(caller.as_str())
        .bind(document.as_str())
        .bind(page.clamped_limit())
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM execution_history WHERE caller_id = ? AND document_id = ?",
        )
        .bind(caller.as_str())
        .bind(document.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(RecordPage { records, total })
    }

    /// Fetch one record, only if it belongs to `caller`
    pub async fn get(&self, caller: &CallerId, id: &str) -> HistoryResult<Option<ExecutionRecord>> {
        let record = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM execution_history WHERE id = ? AND caller_id = ?"
        ))
        .bind(id)
        .bind(caller.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn stats_for_caller(&self, caller: &CallerId) -> HistoryResult<ExecutionStats> {
        let stats = sqlx::query_as::<_, ExecutionStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM execution_history WHERE caller_id = ?"
        ))
        .bind(caller.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    pub async fn stats_for_document(
        &self,
        caller: &CallerId,
        document: &DocumentId,
    ) -> HistoryResult<ExecutionStats> {
        let stats = sqlx::query_as::<_, ExecutionStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM execution_history WHERE caller_id = ? AND document_id = ?"
        ))
        .bind(caller.as_str())
        .bind(document.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Per-day counts for the last `days` UTC days, today included, newest first.
    /// Days without executions are omitted.
    pub async fn daily_stats(&self, caller: &CallerId, days: u32) -> HistoryResult<Vec<DailyStats>> {
        if days == 0 {
            return Err(HistoryError::InvalidInput(
                "days must be at least 1".to_string(),
            ));
        }
        let today = Utc::now().date_naive();
        let first_day = today - ChronoDuration::days(i64::from(days) - 1);
        let since = first_day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).ok_or_else(|| {
            HistoryError::InvalidInput(format!("cannot compute window for {days} days"))
        })?;

        let daily = sqlx::query_as::<_, DailyStats>(
            "SELECT substr(created_at, 1, 10) AS day,
                COUNT(*) AS executions,
                COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0) AS successful
             FROM execution_history
             WHERE caller_id = ? AND created_at >= ?
             GROUP BY day
             ORDER BY day DESC",
        )
        .bind(caller.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(daily)
    }

    /// Delete this caller's records for one document; returns how many went
    pub async fn delete_for_document(
        &self,
        caller: &CallerId,
        document: &DocumentId,
    ) -> HistoryResult<u64> {
        let result =
            sqlx::query("DELETE FROM execution_history WHERE caller_id = ? AND document_id = ?")
                .bind(caller.as_str())
                .bind(document.as_str())
                .execute(&self.pool)
                .await?;

        info!(caller = %caller, document = %document, deleted = result.rows_affected(), "Deleted document history");
        Ok(result.rows_affected())
    }

    pub async fn delete_for_caller(&self, caller: &CallerId) -> HistoryResult<u64> {
        let result = sqlx::query("DELETE FROM execution_history WHERE caller_id = ?")
            .bind(caller.as_str())
            .execute(&self.pool)
            .await?;

        info!(caller = %caller, deleted = result.rows_affected(), "Deleted caller history");
        Ok(result.rows_affected())
    }

    /// Drop every record created before `cutoff`, for all callers
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> HistoryResult<u64> {
        let result = sqlx::query("DELETE FROM execution_history WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        info!(cutoff = %cutoff, deleted = result.rows_affected(), "Purged execution history");
        Ok(result.rows_affected())
    }
}

fn check_page(page: &Page) -> HistoryResult<()> {
    if page.limit == 0 {
        return Err(HistoryError::InvalidInput(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl HistorySink for HistoryStore {
    async fn record(
        &self,
        caller: &CallerId,
        document: Option<&DocumentId>,
        outcome: &ExecutionOutcome,
        duration_ms: u64,
    ) -> anyhow::Result<String> {
        Ok(HistoryStore::record(self, caller, document, outcome, duration_ms).await?)
    }
}

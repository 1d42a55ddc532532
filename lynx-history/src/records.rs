//! Row types returned by the history store

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Largest page a single list call returns
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// One stored execution
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExecutionRecord {
    pub id: String,
    pub caller_id: String,
    pub document_id: Option<String>,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub failure: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Limit/offset window over a most-recent-first listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    pub(crate) fn clamped_limit(&self) -> u32 {
        self.limit.min(MAX_PAGE_LIMIT)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// A page of records plus the size of the whole filtered set
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub records: Vec<ExecutionRecord>,
    pub total: i64,
}

/// Aggregates over a caller's (or one document's) executions
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ExecutionStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub distinct_documents: i64,
    pub last_executed: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.successful as f64 / self.total as f64)
        }
    }
}

/// Executions on one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyStats {
    /// `YYYY-MM-DD`
    pub day: String,
    pub executions: i64,
    pub successful: i64,
}

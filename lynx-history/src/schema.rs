//! Table layout for execution records

use crate::error::HistoryResult;
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS execution_history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        caller_id TEXT NOT NULL,
        document_id TEXT,
        success BOOLEAN NOT NULL,
        output TEXT,
        error TEXT,
        failure TEXT,
        duration_ms INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_execution_history_caller
        ON execution_history(caller_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_execution_history_document
        ON execution_history(caller_id, document_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_execution_history_created_at
        ON execution_history(created_at)",
];

/// Create the table and indexes if they do not exist yet
pub async fn migrate(pool: &SqlitePool) -> HistoryResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

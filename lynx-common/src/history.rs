//! Seam between the orchestrator and whatever persists the audit trail

use crate::{CallerId, DocumentId, ExecutionOutcome};
use async_trait::async_trait;

/// Append-only sink for execution records.
///
/// Implementations return the id of the stored record. The orchestrator
/// treats every call as best-effort: errors are logged there and never reach
/// the caller of `execute`.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(
        &self,
        caller: &CallerId,
        document: Option<&DocumentId>,
        outcome: &ExecutionOutcome,
        duration_ms: u64,
    ) -> anyhow::Result<String>;
}

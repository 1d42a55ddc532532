//! Execution history for the Lynx execution service
//!
//! Stores one record per authenticated execution in SQLite and answers the
//! caller-scoped queries the CLI exposes: listings, per-record lookup,
//! aggregates and retention purges.

pub mod config;
pub mod error;
pub mod records;
pub mod schema;
pub mod store;

pub use config::HistoryConfig;
pub use error::{HistoryError, HistoryResult};
pub use records::{DailyStats, ExecutionRecord, ExecutionStats, Page, RecordPage, MAX_PAGE_LIMIT};
pub use store::HistoryStore;

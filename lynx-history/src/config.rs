use serde::{Deserialize, Serialize};
use std::time::Duration;

/// History store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Path to the SQLite database holding execution records
    pub database_path: String,

    /// Records older than this are removed by `history purge`
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_path: HistoryConfig::default_database_path(),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl HistoryConfig {
    fn default_database_path() -> String {
        "~/.local/share/lynx-exec/history.sqlite".to_string()
    }
}

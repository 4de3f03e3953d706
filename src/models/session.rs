use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One continuous interval during which blocking was engaged, bounded by
/// an activation and the following deactivation. Closed sessions are
/// never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Number of apps in the blocked set when the session opened.
    pub blocked_app_count: u32,
}

impl EnforcementSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}


use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// One recorded ingestion of a source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngestRun {
    pub id: i64,
    pub source_path: String,
    pub status: IngestStatus,
    pub total_chunks: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum IngestStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for IngestStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IngestStatus::Running => write!(f, "Running"),
            IngestStatus::Completed => write!(f, "Completed"),
            IngestStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Final counters written when a run completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestCounts {
    pub total_chunks: i64,
    pub success_count: i64,
    pub error_count: i64,
}

impl IngestRun {
    /// Wall-clock duration of a finished run
    #[inline]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}

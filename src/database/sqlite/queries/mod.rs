
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const INGEST_RUN_COLUMNS: &str = "id, source_path, status, total_chunks, success_count, error_count, error_message, started_at, finished_at";

pub struct IngestRunQueries;

impl IngestRunQueries {
    /// Record the start of a run
    #[inline]
    pub async fn start(pool: &SqlitePool, source_path: &str) -> Result<IngestRun> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO ingest_runs (source_path, status, started_at) VALUES (?, 'running', ?)",
        )
        .bind(source_path)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record ingest run")?
        .last_insert_rowid();

        debug!("Started ingest run {} for {}", id, source_path);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created ingest run"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<IngestRun>> {
        let query = format!("SELECT {} FROM ingest_runs WHERE id = ?", INGEST_RUN_COLUMNS);
        let result = sqlx::query_as::<_, IngestRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get ingest run by id")?;

        Ok(result)
    }

    /// Mark a run completed with its final counters
    #[inline]
    pub async fn complete(pool: &SqlitePool, id: i64, counts: IngestCounts) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_runs SET status = 'completed', total_chunks = ?, success_count = ?, error_count = ?, finished_at = ? WHERE id = ?",
        )
        .bind(counts.total_chunks)
        .bind(counts.success_count)
        .bind(counts.error_count)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete ingest run")?;

        Ok(())
    }

    /// Mark a run failed
    #[inline]
    pub async fn fail(pool: &SqlitePool, id: i64, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_runs SET status = 'failed', error_message = ?, finished_at = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark ingest run as failed")?;

        Ok(())
    }

    /// Most recent runs first
    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestRun>> {
        let query = format!(
            "SELECT {} FROM ingest_runs ORDER BY started_at DESC, id DESC LIMIT ?",
            INGEST_RUN_COLUMNS
        );
        let runs = sqlx::query_as::<_, IngestRun>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
            .context("Failed to list ingest runs")?;

        Ok(runs)
    }
}

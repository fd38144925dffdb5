use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{IngestCounts, IngestRun};
use crate::database::sqlite::queries::IngestRunQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// SQLite ledger of ingestion runs
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    #[inline]
    pub async fn start_ingest_run(&self, source_path: &str) -> Result<IngestRun> {
        IngestRunQueries::start(&self.pool, source_path).await
    }

    #[inline]
    pub async fn complete_ingest_run(&self, id: i64, counts: IngestCounts) -> Result<()> {
        IngestRunQueries::complete(&self.pool, id, counts).await
    }

    #[inline]
    pub async fn fail_ingest_run(&self, id: i64, error_message: &str) -> Result<()> {
        IngestRunQueries::fail(&self.pool, id, error_message).await
    }

    #[inline]
    pub async fn recent_ingest_runs(&self, limit: i64) -> Result<Vec<IngestRun>> {
        IngestRunQueries::list_recent(&self.pool, limit).await
    }
}

//! Persistent success/failure counters for machine updates.
//!
//! A single keyed row in PostgreSQL holds cumulative totals across runs.
//! The pipeline only ever increments it; nothing here is read back for
//! decision-making. The orchestrator treats every failure as best-effort:
//! logged and swallowed, never aborting the run.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

/// Key of the single counters row.
pub const COUNTER_KEY: &str = "machine-update-status";

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}

/// Client for the cumulative update counters.
pub struct Analytics {
    pool: PgPool,
}

impl Analytics {
    /// Connects to the database and returns a new client.
    pub async fn connect(database_url: &str) -> Result<Self, AnalyticsError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| AnalyticsError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Ensures the counters table exists.
    pub async fn ensure_schema(&self) -> Result<(), AnalyticsError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS update_counters (
                id TEXT PRIMARY KEY,
                successful_updates BIGINT NOT NULL DEFAULT 0,
                failed_updates BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Adds the run's totals to the cumulative counters.
    ///
    /// Creates the row with the deltas as initial values if absent,
    /// otherwise increments both fields atomically in one statement.
    pub async fn record_counts(
        &self,
        success_delta: u64,
        failure_delta: u64,
    ) -> Result<(), AnalyticsError> {
        sqlx::query(
            r#"
            INSERT INTO update_counters (id, successful_updates, failed_updates, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                successful_updates = update_counters.successful_updates + EXCLUDED.successful_updates,
                failed_updates = update_counters.failed_updates + EXCLUDED.failed_updates,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(COUNTER_KEY)
        .bind(success_delta as i64)
        .bind(failure_delta as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            successes = success_delta,
            failures = failure_delta,
            "recorded update counters"
        );
        Ok(())
    }
}

/// Connects, ensures the schema and records the run totals, logging and
/// swallowing any error. The counters must never abort the orchestrator.
pub async fn record_best_effort(database_url: Option<&str>, successes: u64, failures: u64) {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, skipping analytics counters");
        return;
    };

    let result = async {
        let analytics = Analytics::connect(url).await?;
        analytics.ensure_schema().await?;
        analytics.record_counts(successes, failures).await
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to record analytics counters, continuing");
    }
}

//! Database initialization
//!
//! Creates the database file on first run and applies the schema with
//! idempotent CREATE TABLE IF NOT EXISTS statements, so startup against an
//! existing database is a no-op.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows concurrent readers with one writer; webhook ingestion and
    // pipeline runs write from separate tasks
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_all_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. Single connection so every query sees the
/// same memory instance.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    create_all_tables(&pool).await?;

    Ok(pool)
}

/// Apply the full schema (idempotent, safe to call repeatedly)
pub async fn create_all_tables(pool: &SqlitePool) -> Result<()> {
    create_campaigns_table(pool).await?;
    create_contacts_table(pool).await?;
    create_icp_results_table(pool).await?;
    create_pipeline_runs_table(pool).await?;
    create_campaign_logs_table(pool).await?;
    create_outbound_messages_table(pool).await?;
    create_email_tracking_events_table(pool).await?;
    create_engagement_history_table(pool).await?;
    create_conversion_events_table(pool).await?;
    create_voice_calls_table(pool).await?;
    Ok(())
}

pub async fn create_campaigns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            prompt TEXT NOT NULL,
            platform TEXT NOT NULL DEFAULT 'email',
            role_filters TEXT NOT NULL DEFAULT '[]',
            location_filters TEXT NOT NULL DEFAULT '[]',
            category_filters TEXT NOT NULL DEFAULT '[]',
            company_filters TEXT NOT NULL DEFAULT '[]',
            pipeline_state TEXT NOT NULL DEFAULT 'CREATED',
            approval_required INTEGER NOT NULL DEFAULT 1,
            generated_content TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            role TEXT,
            company TEXT,
            location TEXT,
            category TEXT,
            language TEXT NOT NULL DEFAULT 'en',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_icp_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS icp_results (
            id TEXT PRIMARY KEY,
            contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            buying_probability_score REAL NOT NULL,
            label TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_icp_results_contact ON icp_results(contact_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_pipeline_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            state TEXT NOT NULL,
            error_message TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_campaign ON pipeline_runs(campaign_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_campaign_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_logs (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            stage TEXT NOT NULL,
            level TEXT NOT NULL DEFAULT 'INFO',
            message TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_campaign_logs_campaign ON campaign_logs(campaign_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_outbound_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbound_messages (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            channel TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            provider_message_id TEXT,
            subject TEXT,
            body TEXT,
            error_message TEXT,
            sent_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outbound_messages_campaign ON outbound_messages(campaign_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_outbound_messages_provider_id ON outbound_messages(provider_message_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_email_tracking_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_tracking_events (
            id TEXT PRIMARY KEY,
            campaign_id TEXT,
            email TEXT NOT NULL,
            event_type TEXT NOT NULL,
            provider_message_id TEXT,
            payload TEXT,
            occurred_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_email_tracking_email ON email_tracking_events(email)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_email_tracking_campaign ON email_tracking_events(campaign_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_engagement_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS engagement_history (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            contact_id TEXT,
            channel TEXT NOT NULL,
            engagement_type TEXT NOT NULL,
            payload TEXT,
            occurred_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_engagement_campaign ON engagement_history(campaign_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_engagement_occurred ON engagement_history(occurred_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_conversion_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversion_events (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            contact_id TEXT,
            kind TEXT NOT NULL,
            occurred_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversion_campaign ON conversion_events(campaign_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_voice_calls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_calls (
            id TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
            contact_id TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            call_sid TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'INITIATED',
            language TEXT NOT NULL DEFAULT 'en-US',
            conversation_log TEXT,
            captured_email TEXT,
            duration_seconds INTEGER,
            payload TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_voice_calls_sid ON voice_calls(call_sid)")
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        // Second pass over an existing schema must not error
        create_all_tables(&pool).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(count >= 10, "expected all entity tables, got {}", count);
    }
}

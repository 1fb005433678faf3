//! Database initialization
//!
//! Creates the SQLite file on first run and (idempotently) the two log
//! tables the recorder writes to.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets metrics reads proceed while the recorder writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create log tables and indexes if they don't exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_service_logs_table(pool).await?;
    create_access_logs_table(pool).await?;
    info!("Database tables initialized (service_logs, access_logs)");
    Ok(())
}

async fn create_service_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            ts TEXT NOT NULL,
            service_type TEXT NOT NULL,
            service_name TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            status TEXT NOT NULL,
            latency_ms REAL NOT NULL,
            candidate_count INTEGER,
            payload_size_bytes INTEGER,
            timeout INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            result TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_service_logs_name_ts ON service_logs(service_name, ts DESC)",
        "CREATE INDEX IF NOT EXISTS idx_service_logs_type_ts ON service_logs(service_type, ts DESC)",
        "CREATE INDEX IF NOT EXISTS idx_service_logs_request ON service_logs(request_id)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

async fn create_access_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS access_logs (
            request_id TEXT PRIMARY KEY,
            ts TEXT NOT NULL,
            route TEXT NOT NULL,
            has_image INTEGER NOT NULL,
            has_question INTEGER NOT NULL,
            image_sha256 TEXT,
            image_size_bytes INTEGER NOT NULL,
            decision TEXT NOT NULL,
            identity_label TEXT,
            identity_score REAL,
            timing_ms REAL NOT NULL,
            status_code INTEGER NOT NULL,
            services_queried INTEGER NOT NULL,
            services_ok INTEGER NOT NULL,
            services_timeout INTEGER NOT NULL,
            services_error INTEGER NOT NULL,
            context_used INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_access_logs_ts ON access_logs(ts DESC)",
        "CREATE INDEX IF NOT EXISTS idx_access_logs_decision_ts ON access_logs(decision, ts DESC)",
        "CREATE INDEX IF NOT EXISTS idx_access_logs_route_ts ON access_logs(route, ts DESC)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_database_creates_file_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("idfuse.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%_logs' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["access_logs", "service_logs"]);
    }

    #[tokio::test]
    async fn test_create_schema_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("idfuse.db")).await.unwrap();

        create_schema(&pool).await.unwrap();
        create_schema(&pool).await.unwrap();
    }
}

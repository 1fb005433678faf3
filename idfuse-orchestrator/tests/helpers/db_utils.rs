//! Database Test Utilities

use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a temporary database with the log schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = idfuse_common::db::init_database(&temp_dir.path().join("idfuse_test.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

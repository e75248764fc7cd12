/// Integration tests for database module
///
/// Tests the complete database lifecycle including:
/// - Database creation and initialization
/// - WAL mode configuration
/// - Schema creation via migrations
/// - Reopening an existing store
/// - Graceful shutdown with WAL flush
use sidekick_engine::db::{Database, TaskStatus};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tasks.db");

    // Create database
    let db = Database::new(&db_path).await.unwrap();

    // Verify database file exists
    assert!(db_path.exists());

    // Verify WAL file exists (created when WAL mode is enabled)
    let wal_path = temp_dir.path().join("tasks.db-wal");
    assert!(wal_path.exists());

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");

    // Close database (flushes WAL)
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_database_schema_complete() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("tasks.db")).await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert!(tables.contains(&"tasks".to_string()), "tasks table missing");

    let indexes: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();
    assert!(indexes.contains(&"idx_tasks_status_id".to_string()));
    assert!(indexes.contains(&"idx_tasks_single_running".to_string()));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_tasks_table_constraints() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("tasks.db")).await.unwrap();

    let insert = "INSERT INTO tasks (sender, message, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)";

    let result = sqlx::query(insert)
        .bind("+1555")
        .bind("test input")
        .bind("pending")
        .bind(1234567890i64)
        .bind(1234567890i64)
        .execute(db.pool())
        .await;
    assert!(result.is_ok());

    // Invalid status value fails the CHECK constraint
    let result = sqlx::query(insert)
        .bind("+1555")
        .bind("test input")
        .bind("invalid_status")
        .bind(1234567890i64)
        .bind(1234567890i64)
        .execute(db.pool())
        .await;
    assert!(result.is_err());

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_preserves_tasks() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("tasks.db");

    let first_id = {
        let db = Database::new(&db_path).await.unwrap();
        let task = db.tasks().create_task("cli", "remember me").await.unwrap();
        db.close().await.unwrap();
        task.id
    };

    // Migrations are idempotent
    let db = Database::new(&db_path).await.unwrap();
    let repo = db.tasks();
    let task = repo.get_task(first_id).await.unwrap().unwrap();
    assert_eq!(task.message, "remember me");
    assert_eq!(task.status, TaskStatus::Pending);

    // Ids keep increasing across restarts
    let second = repo.create_task("cli", "and me").await.unwrap();
    assert!(second.id > first_id);

    db.close().await.unwrap();
}

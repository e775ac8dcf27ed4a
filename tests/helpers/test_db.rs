use livedesk::infrastructure::persistence::Database;

pub async fn setup_test_db() -> Database {
    // Install drivers for AnyPool (required for tests)
    sqlx::any::install_default_drivers();

    // File-based SQLite, unique per test so tests can run in parallel
    use uuid::Uuid;
    let temp_file = std::env::temp_dir().join(format!("livedesk_test_{}.db", Uuid::new_v4()));
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.display());

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");

    db.run_migrations()
        .await
        .expect("Failed to run migrations");

    db
}

pub async fn teardown_test_db(db: Database) {
    db.close().await;
    drop(db);
    // Note: Test database files live in the OS temp dir
}

/// Raw `updated_at` column of a conversation row.
pub async fn conversation_updated_at(db: &Database, conversation_id: &str) -> chrono::DateTime<chrono::Utc> {
    let value: String = sqlx::query_scalar("SELECT updated_at FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .fetch_one(db.pool())
        .await
        .expect("Failed to read updated_at");
    chrono::DateTime::parse_from_rfc3339(&value)
        .expect("updated_at is RFC 3339")
        .with_timezone(&chrono::Utc)
}

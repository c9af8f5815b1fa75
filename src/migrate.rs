use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run at every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            source TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // (channel_id, message_ts) is the dedup key for inbound events;
    // the uniqueness constraint here is what makes ingestion atomic.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_ts TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            text TEXT NOT NULL,
            thread_ts TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(channel_id, message_ts)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vector index collection. Record ids are deterministic
    // (sha256 of source_type, source_id, chunk_index) so re-indexing
    // overwrites rather than duplicates.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embedding_records (
            id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            channel_id TEXT,
            title TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS answer_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            confidence TEXT NOT NULL,
            channel_id TEXT,
            sources_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_turns_conversation
         ON conversation_turns(conversation_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_source
         ON embedding_records(source_type, source_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_channel ON chat_messages(channel_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON chat_messages(thread_ts)")
        .execute(pool)
        .await?;

    Ok(())
}

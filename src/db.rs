use sqlx::PgPool;

// Embedded, idempotent schema bootstrap. Users and sessions are plain
// relational rows; posts are one JSONB document per row with the filterable
// fields denormalized into columns. `seq` preserves insertion order for the
// listing queries.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        user_id BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        category TEXT NOT NULL,
        author_name TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
];

/// Creates the schema on a fresh database. Safe to run at every startup.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

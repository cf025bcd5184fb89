use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Connection pool
// ---------------------------------------------------------------------------

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    tracing::info!("postgres_pool_connecting");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    tracing::info!("postgres_pool_connected");
    Ok(pool)
}

/// Bootstrap the two append-only tables. Idempotent, runs at every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhooks (
            id UUID PRIMARY KEY,
            strategy_id TEXT NOT NULL,
            payload JSONB NOT NULL,
            received_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            id BIGSERIAL PRIMARY KEY,
            webhook_id UUID NOT NULL,
            strategy_id TEXT NOT NULL,
            status TEXT NOT NULL,
            response JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_webhooks_strategy ON webhooks (strategy_id, received_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_responses_strategy ON responses (strategy_id, created_at DESC)")
        .execute(pool)
        .await?;

    tracing::info!("postgres_schema_ready");
    Ok(())
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub strategy_id: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResponseRow {
    pub id: i64,
    pub webhook_id: Uuid,
    pub strategy_id: String,
    pub status: String,
    pub response: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Default, sqlx::FromRow)]
pub struct StorageStats {
    pub webhooks: i64,
    pub responses: i64,
    pub successes: i64,
    pub errors: i64,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub async fn insert_webhook(
    pool: &PgPool,
    id: Uuid,
    strategy_id: &str,
    payload: &Value,
) -> Result<()> {
    sqlx::query("INSERT INTO webhooks (id, strategy_id, payload) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(strategy_id)
        .bind(payload)
        .execute(pool)
        .await?;

    tracing::info!(webhook_id = %id, strategy_id, "webhook_written");
    Ok(())
}

pub async fn insert_response(
    pool: &PgPool,
    webhook_id: Uuid,
    strategy_id: &str,
    status: &str,
    response: &Value,
) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO responses (webhook_id, strategy_id, status, response)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(webhook_id)
    .bind(strategy_id)
    .bind(status)
    .bind(response)
    .fetch_one(pool)
    .await?;

    tracing::info!(response_id = id, webhook_id = %webhook_id, status, "response_written");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub async fn recent_webhooks(
    pool: &PgPool,
    limit: i64,
    strategy_ids: Option<&[String]>,
) -> Result<Vec<WebhookRow>> {
    let rows = sqlx::query_as::<_, WebhookRow>(
        r#"
        SELECT id, strategy_id, payload, received_at
        FROM webhooks
        WHERE $2::text[] IS NULL OR strategy_id = ANY($2)
        ORDER BY received_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .bind(strategy_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_responses(
    pool: &PgPool,
    limit: i64,
    strategy_ids: Option<&[String]>,
) -> Result<Vec<ResponseRow>> {
    let rows = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, webhook_id, strategy_id, status, response, created_at
        FROM responses
        WHERE $2::text[] IS NULL OR strategy_id = ANY($2)
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .bind(strategy_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn webhook_payload(pool: &PgPool, id: Uuid) -> Result<Option<WebhookRow>> {
    let row = sqlx::query_as::<_, WebhookRow>(
        "SELECT id, strategy_id, payload, received_at FROM webhooks WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn stats(pool: &PgPool) -> Result<StorageStats> {
    let row = sqlx::query_as::<_, StorageStats>(
        r#"
        SELECT
            (SELECT count(*) FROM webhooks) AS webhooks,
            (SELECT count(*) FROM responses) AS responses,
            (SELECT count(*) FROM responses WHERE status = 'success') AS successes,
            (SELECT count(*) FROM responses WHERE status = 'error') AS errors
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

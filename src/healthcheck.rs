use std::time::Duration;

use anyhow::{Context, Result};

const CHECK_INTERVAL: Duration = Duration::from_secs(2);
const TIMEOUT: Duration = Duration::from_secs(60);

/// Blocks until PostgreSQL is reachable.
///
/// Polled every 2 seconds, fails after 60 seconds if still unreachable.
pub async fn wait_for_postgres(database_url: &str) -> Result<()> {
    tracing::info!("healthcheck_starting");

    let deadline = tokio::time::Instant::now() + TIMEOUT;

    loop {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                pool.close().await;
                tracing::info!("postgres_ready");
                return Ok(());
            }
            Err(e) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(e).context("PostgreSQL not ready within 60s");
                }
                tracing::warn!(error = %e, "waiting_for_postgres");
                tokio::time::sleep(CHECK_INTERVAL).await;
            }
        }
    }
}

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

pub type Db = sqlx::PgPool;

const MAX_CONNECTIONS: u32 = 5;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// Connect at startup with a capped number of retries and linear backoff.
/// If the store stays unreachable the process keeps serving on a lazy pool:
/// individual requests fail with a service-unavailable response until
/// connectivity is restored.
pub async fn connect_with_retry(url: &str, max_retries: u32, delay: Duration) -> anyhow::Result<Db> {
    for attempt in 1..=max_retries {
        match pool_options().connect(url).await {
            Ok(pool) => {
                info!("database connected");
                if let Err(err) = sqlx::migrate!().run(&pool).await {
                    warn!("migrations failed: {err}");
                }
                return Ok(pool);
            }
            Err(err) => {
                warn!("database connection attempt {attempt}/{max_retries} failed: {err}");
                if attempt < max_retries {
                    tokio::time::sleep(delay * attempt).await;
                }
            }
        }
    }

    warn!("max retries reached; continuing to serve, requests will fail until the database is reachable");
    let pool = pool_options().connect_lazy(url)?;
    Ok(pool)
}

pub async fn is_healthy(db: &Db) -> bool {
    sqlx::query("SELECT 1").execute(db).await.is_ok()
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ATTEMPT_TIMEOUT)
}

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use autocare_backend::config::AppConfig;
use autocare_backend::infra::db::connect_with_retry;
use autocare_backend::infra::razorpay::RazorpayClient;
use autocare_backend::routes;
use autocare_backend::security::jwt::JwtManager;
use autocare_backend::state::AppState;

const DB_MAX_RETRIES: u32 = 10;
const DB_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = connect_with_retry(&config.database_url, DB_MAX_RETRIES, DB_RETRY_DELAY).await?;
    let jwt = JwtManager::from_env();
    let razorpay = RazorpayClient::from_env()?;
    tokio::fs::create_dir_all(&config.uploads_dir).await?;

    let state = AppState::new(db, config, jwt, razorpay);
    let app = routes::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        anyhow::anyhow!("failed to bind port {}: {err}", state.config.port)
    })?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

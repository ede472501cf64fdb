use std::path::PathBuf;

use once_cell::sync::Lazy;
use tracing::warn;

static PRODUCTION: Lazy<bool> = Lazy::new(|| {
    std::env::var("APP_ENV")
        .map(|v| v.trim().eq_ignore_ascii_case("production"))
        .unwrap_or(false)
});

/// Whether the process runs in production mode. Controls error-detail
/// verbosity in responses.
pub fn is_production() -> bool {
    *PRODUCTION
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub environment: String,
    pub uploads_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_string("DATABASE_URL").ok_or_else(|| {
            anyhow::anyhow!("DATABASE_URL missing. Please add it to your .env file.")
        })?;
        let port = env_string("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);
        let environment =
            env_string("APP_ENV").unwrap_or_else(|| "development".into());
        let uploads_dir = env_string("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("public/uploads"));

        if environment == "production" && env_string("JWT_SECRET").is_none() {
            warn!("JWT_SECRET is not set in production; tokens are signed with the insecure default");
        }

        Ok(Self {
            port,
            database_url,
            environment,
            uploads_dir,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! Promote an existing user to administrator, or create one if the email is
//! unknown. Usage: `seed-admin [email] [password] [name]`.

use sqlx::postgres::PgPoolOptions;
use sqlx::Row;

use autocare_backend::security::password::hash_password;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL is not set in .env"))?;

    let mut args = std::env::args().skip(1);
    let email = args
        .next()
        .unwrap_or_else(|| "admin123@gmail.com".into())
        .to_lowercase();
    let password = args.next().unwrap_or_else(|| "admin123".into());
    let name = args.next().unwrap_or_else(|| "Admin User".into());

    let db = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    let existing = sqlx::query("SELECT id FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&db)
        .await?;

    match existing {
        Some(row) => {
            let id: uuid::Uuid = row.get("id");
            sqlx::query("UPDATE users SET is_admin = true, updated_at = now() WHERE id = $1")
                .bind(id)
                .execute(&db)
                .await?;
            tracing::info!("existing user promoted to admin: {email}");
        }
        None => {
            let hash = hash_password(&password).map_err(|e| anyhow::anyhow!(e))?;
            sqlx::query(
                "INSERT INTO users (name, email, phone_number, password_hash, is_admin)
                 VALUES ($1, $2, '9999999999', $3, true)",
            )
            .bind(&name)
            .bind(&email)
            .bind(&hash)
            .execute(&db)
            .await?;
            tracing::info!("admin user created: {email}");
        }
    }

    Ok(())
}

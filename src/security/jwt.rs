use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::warn;

const INSECURE_DEFAULT_SECRET: &str = "dev-secret-change-me";
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    ttl: Duration,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token error: {0}")]
    Token(String),
}

impl JwtManager {
    /// Reads `JWT_SECRET`. The default is deliberately insecure and loudly
    /// flagged so operators override it in real deployments.
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("JWT_SECRET not set; using the insecure development default");
                INSECURE_DEFAULT_SECRET.into()
            });
        Self::new(secret, Duration::days(TOKEN_TTL_DAYS))
    }

    pub fn new(secret: String, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn issue(&self, subject: &str) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: subject.to_string(),
            exp: (now + self.ttl).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| JwtError::Token(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| JwtError::Token(e.to_string()))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let jwt = JwtManager::new("test-secret".into(), Duration::days(30));
        let token = jwt.issue("user-42").expect("issue");
        let claims = jwt.verify(&token).expect("verify");
        assert_eq!(claims.sub, "user-42");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = JwtManager::new("secret-a".into(), Duration::days(30));
        let verifier = JwtManager::new("secret-b".into(), Duration::days(30));
        let token = issuer.issue("user-42").expect("issue");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let jwt = JwtManager::new("test-secret".into(), Duration::days(30));
        let mut token = jwt.issue("user-42").expect("issue");
        token.pop();
        token.push('A');
        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = JwtManager::new("test-secret".into(), Duration::minutes(-10));
        let token = jwt.issue("user-42").expect("issue");
        assert!(jwt.verify(&token).is_err());
    }
}

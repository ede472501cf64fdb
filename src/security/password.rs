use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use thiserror::Error;

static ARGON2: Lazy<Argon2<'static>> = Lazy::new(|| {
    let params = Params::new(64 * 1024, 3, 4, None).expect("params");
    Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params)
});

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("hash error: {0}")]
    Hash(String),
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    ARGON2
        .hash_password(plain.as_bytes(), &salt)
        .map(|p| p.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(ARGON2.verify_password(plain.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("hunter2!").expect("hash");
        assert_ne!(hash, "hunter2!");
        assert!(verify_password("hunter2!", &hash).expect("verify"));
        assert!(!verify_password("hunter3!", &hash).expect("verify"));
    }

    #[test]
    fn garbage_hash_is_an_error_not_a_match() {
        assert!(verify_password("hunter2!", "not-a-phc-string").is_err());
    }
}

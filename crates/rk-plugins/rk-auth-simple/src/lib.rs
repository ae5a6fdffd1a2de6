//! # rk-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`.
//! Hashing runs on the blocking pool so it never stalls request handling.

use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rk_core::traits::AuthProvider;

const SALT_LEN: usize = 16;

#[derive(Default)]
pub struct SimpleAuthProvider {
    argon2: Argon2<'static>,
}

impl SimpleAuthProvider {
    /// Argon2id with the crate's default cost parameters.
    pub fn new() -> Self {
        Self::default()
    }
}

fn fresh_salt() -> anyhow::Result<SaltString> {
    let mut bytes = [0u8; SALT_LEN];
    getrandom::getrandom(&mut bytes).map_err(|e| anyhow!("failed to gather entropy: {e}"))?;
    SaltString::encode_b64(&bytes).map_err(|e| anyhow!("failed to encode salt: {e}"))
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    /// Returns a PHC string (`$argon2id$v=19$...`) embedding the salt.
    async fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = fresh_salt()?;
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| anyhow!("failed to hash password: {e}"))
        })
        .await?
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed_hash = match PasswordHash::new(&hash) {
                Ok(p) => p,
                Err(_) => return false,
            };
            argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok()
        })
        .await
        .unwrap_or(false)
    }
}

//! # AccountService
//!
//! Sign-up and log-in on top of a [`UserRepo`] and an [`AuthProvider`].
//! Sessions are left to the client; the server only hands back the user id.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::requests::Credentials;
use crate::traits::{AuthProvider, UserRepo};

pub const MIN_PASSWORD_LEN: usize = 8;
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Checks a new password against the account policy, reporting the first
/// rule it breaks.
pub fn check_password_policy(password: &str) -> Result<()> {
    let fail = |msg: &str| Err(AppError::ValidationError(msg.to_string()));

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return fail("password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return fail("password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return fail("password must contain at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return fail("password must contain at least one special character");
    }
    Ok(())
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::ValidationError("missing required field: email".into()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::ValidationError("email address is malformed".into())),
    }
}

pub struct AccountService {
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepo>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { users, auth }
    }

    /// Registers an account and returns its id.
    pub async fn sign_up(&self, creds: Credentials) -> Result<String> {
        let email = normalize_email(&creds.email)?;
        check_password_policy(&creds.password)?;

        let hash = self
            .auth
            .hash_password(&creds.password)
            .await
            .map_err(|e| AppError::storage("failed to hash password", e))?;

        let user = self
            .users
            .create_user(&email, &hash)
            .await
            .map_err(|e| AppError::storage("failed to create user", e))?
            .ok_or_else(|| AppError::Conflict(format!("an account for {email} already exists")))?;

        log::info!("registered user {}", user.id);
        Ok(user.id)
    }

    /// Returns the user id for valid credentials. Unknown emails and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn log_in(&self, creds: Credentials) -> Result<String> {
        let invalid = || AppError::Unauthorized("invalid credentials".into());
        let email = normalize_email(&creds.email).map_err(|_| invalid())?;

        let user = self
            .users
            .find_user_by_email(&email)
            .await
            .map_err(|e| AppError::storage("failed to look up user", e))?
            .ok_or_else(invalid)?;

        if !self.auth.verify_password(&creds.password, &user.password_hash).await {
            log::debug!("failed login for {}", user.id);
            return Err(invalid());
        }
        Ok(user.id)
    }
}

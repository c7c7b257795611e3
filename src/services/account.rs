//! Account service
//!
//! Registration and credential authentication. Session issuance lives in
//! `services::session`; this service only answers "who is this user".

use crate::db::repositories::UserRepository;
use crate::models::User;
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;

/// Minimum accepted password length
const MIN_PASSWORD_LENGTH: usize = 8;

/// Error types for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("Email '{0}' is already registered")]
    EmailExists(String),

    /// Authentication failed. The message is deliberately uniform so the
    /// caller cannot distinguish a missing account from a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

/// Account service for registration and credential checks
pub struct AccountService {
    user_repo: Arc<dyn UserRepository>,
}

impl AccountService {
    /// Create a new account service
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Register a new user.
    ///
    /// Emails are lowercased before storage and lookup. The first account
    /// registered becomes an administrator.
    pub async fn register(&self, input: RegisterInput) -> Result<User, AccountServiceError> {
        let email = input.email.trim().to_lowercase();

        if email.is_empty() || !email.contains('@') {
            return Err(AccountServiceError::ValidationError(
                "A valid email address is required".to_string(),
            ));
        }
        if input.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AccountServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(AccountServiceError::EmailExists(email));
        }

        let is_first = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?
            == 0;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let mut user = User::new(email, password_hash, input.full_name.trim().to_string());
        user.is_admin = is_first;

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = %created.id, "Registered new user");
        Ok(created)
    }

    /// Authenticate a user by email and password.
    ///
    /// Missing accounts, deactivated accounts, and wrong passwords all
    /// produce the same `InvalidCredentials` error. A successful login
    /// touches `last_login_at`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, AccountServiceError> {
        let email = email.trim().to_lowercase();

        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up user")?
            .ok_or(AccountServiceError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AccountServiceError::InvalidCredentials);
        }

        let matches = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !matches {
            return Err(AccountServiceError::InvalidCredentials);
        }

        self.user_repo
            .touch_last_login(&user.id)
            .await
            .context("Failed to record login time")?;

        Ok(user)
    }

    /// Replace a user's password, typically after reset-token verification.
    pub async fn reset_password(
        &self,
        user_id: &str,
        new_password: &str,
    ) -> Result<(), AccountServiceError> {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(AccountServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user_id, &password_hash)
            .await
            .context("Failed to update password")?;

        tracing::info!(user_id = %user_id, "Password reset");
        Ok(())
    }

    /// Look up a user by id
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AccountServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?)
    }

    /// Look up a user by email
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, AccountServiceError> {
        Ok(self
            .user_repo
            .get_by_email(&email.trim().to_lowercase())
            .await
            .context("Failed to get user")?)
    }
}

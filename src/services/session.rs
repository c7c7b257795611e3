//! Session manager
//!
//! Issues signed session tokens, restores sessions from a cached token,
//! and handles logout, per-token revocation, and single-use password reset
//! tokens.
//!
//! Revocation is a positive lookup: every issued token gets a row in
//! `auth_tokens`, and a token whose hash is no longer present is treated as
//! revoked no matter how valid its signature is. Deleting rows is the only
//! revocation mechanism; nothing is ever flagged in place.

use crate::cache::TokenCache;
use crate::config::AuthConfig;
use crate::db::repositories::{AuditRepository, TokenRepository, UserRepository};
use crate::models::{AuthEvent, AuthEventKind, RevocationRecord, TokenClaims, TokenKind, User};
use crate::services::signer::{token_hash, TokenError, TokenSigner};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Token failed stateless verification
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Reset token is valid but its record is gone (already used or revoked)
    #[error("Reset token already used or revoked")]
    ResetUsed,

    /// Referenced user does not exist
    #[error("User not found")]
    UserNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Why an auto-login attempt failed.
///
/// The variants are ordered the way the pipeline checks them: cheap
/// stateless checks first, then store lookups. `Unavailable` means the
/// datastore could not be reached; the caller sees a logged-out session
/// rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NoToken,
    Malformed,
    BadSignature,
    Expired,
    Revoked,
    UserMissing,
    Unavailable,
}

impl AuthFailure {
    /// Short reason string for logs and audit rows. Never shown to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::NoToken => "no_token",
            AuthFailure::Malformed => "malformed",
            AuthFailure::BadSignature => "bad_signature",
            AuthFailure::Expired => "expired",
            AuthFailure::Revoked => "revoked",
            AuthFailure::UserMissing => "user_missing",
            AuthFailure::Unavailable => "unavailable",
        }
    }
}

/// Result of an auto-login attempt. Deliberately not a `Result`: a failed
/// restore is a normal outcome, not an error to propagate.
#[derive(Debug)]
pub enum AutoLoginOutcome {
    /// Token checked out and the account is live
    Authenticated(User),
    /// Session could not be restored; the caller is logged out
    Failed(AuthFailure),
}

impl AutoLoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AutoLoginOutcome::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AutoLoginOutcome::Authenticated(user) => Some(user),
            AutoLoginOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<AuthFailure> {
        match self {
            AutoLoginOutcome::Authenticated(_) => None,
            AutoLoginOutcome::Failed(f) => Some(*f),
        }
    }
}

/// Session manager service
pub struct SessionManager {
    signer: TokenSigner,
    token_repo: Arc<dyn TokenRepository>,
    user_repo: Arc<dyn UserRepository>,
    audit_repo: Arc<dyn AuditRepository>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl SessionManager {
    /// Create a session manager from configuration and repositories.
    ///
    /// Fails when the signing secret is missing from configuration.
    pub fn new(
        auth: &AuthConfig,
        token_repo: Arc<dyn TokenRepository>,
        user_repo: Arc<dyn UserRepository>,
        audit_repo: Arc<dyn AuditRepository>,
    ) -> anyhow::Result<Self> {
        let secret = auth.signing_secret()?;
        Ok(Self {
            signer: TokenSigner::new(secret),
            token_repo,
            user_repo,
            audit_repo,
            access_ttl: auth.access_ttl(),
            refresh_ttl: auth.refresh_ttl(),
            reset_ttl: auth.reset_ttl(),
        })
    }

    fn default_ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::Reset => self.reset_ttl,
        }
    }

    /// Issue a signed token and record it in the revocation store.
    ///
    /// `ttl` overrides the configured default for the kind; it must be
    /// positive.
    pub async fn create_session_token(
        &self,
        user_id: &str,
        email: &str,
        kind: TokenKind,
        ttl: Option<Duration>,
    ) -> Result<String, SessionError> {
        if user_id.is_empty() {
            return Err(SessionError::ValidationError(
                "user_id must not be empty".to_string(),
            ));
        }
        if email.is_empty() {
            return Err(SessionError::ValidationError(
                "email must not be empty".to_string(),
            ));
        }
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(kind));
        if ttl <= Duration::zero() {
            return Err(SessionError::ValidationError(
                "ttl must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            issued_at: now,
            expires_at: now + ttl,
        };

        let token = self
            .signer
            .create(kind, &claims)
            .context("Failed to sign token")?;

        let record = RevocationRecord {
            id: 0,
            user_id: user_id.to_string(),
            token_hash: token_hash(&token),
            kind,
            created_at: now,
            expires_at: claims.expires_at,
        };
        self.token_repo
            .insert(&record)
            .await
            .context("Failed to record issued token")?;

        Ok(token)
    }

    /// Issue a session token for a freshly authenticated user.
    ///
    /// `remember` selects the long-lived refresh kind; otherwise the token
    /// is a short-lived access token.
    pub async fn start_session(&self, user: &User, remember: bool) -> Result<String, SessionError> {
        let kind = if remember {
            TokenKind::Refresh
        } else {
            TokenKind::Access
        };
        let token = self
            .create_session_token(&user.id, &user.email, kind, None)
            .await?;
        self.audit(&user.id, AuthEventKind::Login, Some(kind.label().to_string()))
            .await;
        Ok(token)
    }

    /// Stateless verification of a session token: structure, signature,
    /// expiry. Never consults the store, so a revoked token still passes.
    pub fn verify_session_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let (_, claims) = self.signer.decode_session(token)?;
        if claims.is_expired() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Attempt to restore a session from a cached token.
    ///
    /// Checks run in a fixed order, cheapest first: presence, structure,
    /// signature, expiry, then the revocation lookup and the user lookup.
    /// Store errors degrade to `Unavailable` instead of propagating; the
    /// caller simply stays logged out.
    pub async fn auto_login(&self, token: Option<&str>) -> AutoLoginOutcome {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return AutoLoginOutcome::Failed(AuthFailure::NoToken),
        };

        let claims = match self.signer.decode_session(token) {
            Ok((_, claims)) => claims,
            Err(TokenError::Malformed) => {
                tracing::debug!("Auto-login rejected: malformed token");
                return AutoLoginOutcome::Failed(AuthFailure::Malformed);
            }
            Err(_) => {
                tracing::warn!("Auto-login rejected: token signature mismatch");
                return AutoLoginOutcome::Failed(AuthFailure::BadSignature);
            }
        };

        if claims.is_expired() {
            self.audit_failure(&claims.user_id, AuthFailure::Expired).await;
            return AutoLoginOutcome::Failed(AuthFailure::Expired);
        }

        let record = match self.token_repo.get_by_hash(&token_hash(token)).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Auto-login degraded, token store unavailable: {:#}", e);
                return AutoLoginOutcome::Failed(AuthFailure::Unavailable);
            }
        };
        if record.is_none() {
            self.audit_failure(&claims.user_id, AuthFailure::Revoked).await;
            return AutoLoginOutcome::Failed(AuthFailure::Revoked);
        }

        let user = match self.user_repo.get_by_id(&claims.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Auto-login degraded, user store unavailable: {:#}", e);
                return AutoLoginOutcome::Failed(AuthFailure::Unavailable);
            }
        };
        match user {
            Some(user) if user.is_active => AutoLoginOutcome::Authenticated(user),
            _ => {
                self.audit_failure(&claims.user_id, AuthFailure::UserMissing).await;
                AutoLoginOutcome::Failed(AuthFailure::UserMissing)
            }
        }
    }

    /// Auto-login from the client token cache, clearing the cache whenever
    /// the restore fails so a dead token is never retried.
    pub async fn auto_login_from_cache(&self, cache: &dyn TokenCache) -> AutoLoginOutcome {
        let token = cache.get().await;
        let outcome = self.auto_login(token.as_deref()).await;
        if !outcome.is_authenticated() {
            cache.clear().await;
        }
        outcome
    }

    /// Revoke every session token the user holds, on all devices.
    ///
    /// Idempotent: logging out a user with no live tokens succeeds.
    pub async fn logout(&self, user_id: &str) -> Result<(), SessionError> {
        let deleted = self
            .token_repo
            .delete_by_user(user_id, &[TokenKind::Access, TokenKind::Refresh])
            .await
            .context("Failed to delete session tokens")?;

        tracing::debug!(user_id = %user_id, deleted, "Logged out");
        self.audit(user_id, AuthEventKind::Logout, None).await;
        Ok(())
    }

    /// Revoke one specific token, leaving the user's other sessions live.
    ///
    /// Returns `false` when the token was already gone.
    pub async fn revoke_token(&self, token: &str) -> Result<bool, SessionError> {
        Ok(self
            .token_repo
            .delete_by_hash(&token_hash(token))
            .await
            .context("Failed to revoke token")?)
    }

    /// Issue a single-use password reset token for the user.
    pub async fn create_password_reset_token(
        &self,
        user_id: &str,
    ) -> Result<String, SessionError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        let token = self
            .create_session_token(&user.id, &user.email, TokenKind::Reset, None)
            .await?;
        self.audit(&user.id, AuthEventKind::ResetIssued, None).await;
        Ok(token)
    }

    /// Verify a password reset token and consume it.
    ///
    /// On success the backing record is deleted, so a second verification
    /// of the same token fails with `ResetUsed`.
    pub async fn verify_password_reset_token(&self, token: &str) -> Result<User, SessionError> {
        let claims = self.signer.verify(TokenKind::Reset, token)?;

        let consumed = self
            .token_repo
            .delete_by_hash(&token_hash(token))
            .await
            .context("Failed to consume reset token")?;
        if !consumed {
            return Err(SessionError::ResetUsed);
        }

        let user = self
            .user_repo
            .get_by_id(&claims.user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        self.audit(&user.id, AuthEventKind::ResetConsumed, None).await;
        Ok(user)
    }

    /// Delete expired revocation records. Returns the number removed.
    ///
    /// Maintenance only; verification never depends on this running.
    pub async fn cleanup_expired(&self) -> Result<i64, SessionError> {
        let deleted = self
            .token_repo
            .delete_expired()
            .await
            .context("Failed to clean up expired tokens")?;
        if deleted > 0 {
            tracing::info!(deleted, "Purged expired token records");
        }
        Ok(deleted)
    }

    async fn audit_failure(&self, user_id: &str, failure: AuthFailure) {
        self.audit(
            user_id,
            AuthEventKind::AutoLoginFailed,
            Some(failure.reason().to_string()),
        )
        .await;
    }

    /// Best-effort audit write; a failure is logged and swallowed.
    async fn audit(&self, user_id: &str, kind: AuthEventKind, detail: Option<String>) {
        let event = AuthEvent::new(user_id, kind, detail);
        if let Err(e) = self.audit_repo.record(&event).await {
            tracing::warn!("Failed to record auth event: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTokenCache;
    use crate::db::repositories::{SqlxAuditRepository, SqlxTokenRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup() -> (DynDatabasePool, SessionManager) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let auth = AuthConfig::with_secret("session-test-secret");
        let manager = SessionManager::new(
            &auth,
            SqlxTokenRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxAuditRepository::boxed(pool.clone()),
        )
        .expect("Failed to build session manager");

        (pool, manager)
    }

    async fn create_user(pool: &DynDatabasePool, id: &str, email: &str) -> User {
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            full_name: "Test User".to_string(),
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        };
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to create user");
        user
    }

    #[tokio::test]
    async fn test_create_verify_auto_login_roundtrip() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, None)
            .await
            .expect("Failed to create token");

        let claims = manager.verify_session_token(&token).expect("Should verify");
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email, "a@example.com");

        let outcome = manager.auto_login(Some(&token)).await;
        assert_eq!(outcome.user().map(|u| u.id.as_str()), Some("u1"));
    }

    #[tokio::test]
    async fn test_missing_token_fails_first() {
        let (_pool, manager) = setup().await;

        assert_eq!(
            manager.auto_login(None).await.failure(),
            Some(AuthFailure::NoToken)
        );
        assert_eq!(
            manager.auto_login(Some("")).await.failure(),
            Some(AuthFailure::NoToken)
        );
    }

    #[tokio::test]
    async fn test_not_a_token_is_malformed() {
        let (_pool, manager) = setup().await;

        let outcome = manager.auto_login(Some("not-a-token")).await;
        assert_eq!(outcome.failure(), Some(AuthFailure::Malformed));
    }

    #[tokio::test]
    async fn test_tampered_token_fails_signature() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, None)
            .await
            .unwrap();

        // Flip the last digest character to another hex digit
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        let outcome = manager.auto_login(Some(&tampered)).await;
        assert_eq!(outcome.failure(), Some(AuthFailure::BadSignature));
    }

    #[tokio::test]
    async fn test_short_ttl_token_expires() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, Some(Duration::seconds(1)))
            .await
            .unwrap();

        assert!(manager.auto_login(Some(&token)).await.is_authenticated());

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        assert_eq!(
            manager.verify_session_token(&token),
            Err(TokenError::Expired)
        );
        assert_eq!(
            manager.auto_login(Some(&token)).await.failure(),
            Some(AuthFailure::Expired)
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_all_sessions() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let access = manager.start_session(&user, false).await.unwrap();
        let refresh = manager.start_session(&user, true).await.unwrap();

        manager.logout(&user.id).await.expect("Logout should succeed");

        assert_eq!(
            manager.auto_login(Some(&access)).await.failure(),
            Some(AuthFailure::Revoked)
        );
        assert_eq!(
            manager.auto_login(Some(&refresh)).await.failure(),
            Some(AuthFailure::Revoked)
        );

        // Stateless verification still passes: revocation is store-only
        assert!(manager.verify_session_token(&access).is_ok());

        // Idempotent
        manager.logout(&user.id).await.expect("Second logout is a no-op");
    }

    #[tokio::test]
    async fn test_concurrent_sessions_revoke_independently() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        // Same instant, different TTLs: distinct tokens, distinct records
        let laptop = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, Some(Duration::hours(1)))
            .await
            .unwrap();
        let phone = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, Some(Duration::hours(2)))
            .await
            .unwrap();
        assert_ne!(laptop, phone);

        assert!(manager.revoke_token(&laptop).await.unwrap());

        assert_eq!(
            manager.auto_login(Some(&laptop)).await.failure(),
            Some(AuthFailure::Revoked)
        );
        assert!(manager.auto_login(Some(&phone)).await.is_authenticated());

        // Second revoke of the same token reports nothing deleted
        assert!(!manager.revoke_token(&laptop).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleted_user_fails_user_missing() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, None)
            .await
            .unwrap();

        // Deactivate rather than delete; a delete would cascade the token
        // row and trip the revocation check first.
        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind("u1")
            .execute(sqlite)
            .await
            .unwrap();

        assert_eq!(
            manager.auto_login(Some(&token)).await.failure(),
            Some(AuthFailure::UserMissing)
        );
    }

    #[tokio::test]
    async fn test_store_unavailable_degrades() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, None)
            .await
            .unwrap();

        pool.close().await;

        assert_eq!(
            manager.auto_login(Some(&token)).await.failure(),
            Some(AuthFailure::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_issue_validation() {
        let (pool, manager) = setup().await;
        create_user(&pool, "u1", "a@example.com").await;

        let empty_user = manager
            .create_session_token("", "a@example.com", TokenKind::Access, None)
            .await;
        assert!(matches!(empty_user, Err(SessionError::ValidationError(_))));

        let zero_ttl = manager
            .create_session_token("u1", "a@example.com", TokenKind::Access, Some(Duration::zero()))
            .await;
        assert!(matches!(zero_ttl, Err(SessionError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let token = manager
            .create_password_reset_token(&user.id)
            .await
            .expect("Failed to create reset token");

        // A reset token is not a session token
        assert_eq!(
            manager.auto_login(Some(&token)).await.failure(),
            Some(AuthFailure::BadSignature)
        );

        let verified = manager
            .verify_password_reset_token(&token)
            .await
            .expect("First verification should succeed");
        assert_eq!(verified.id, "u1");

        let again = manager.verify_password_reset_token(&token).await;
        assert!(matches!(again, Err(SessionError::ResetUsed)));
    }

    #[tokio::test]
    async fn test_reset_token_for_unknown_user() {
        let (_pool, manager) = setup().await;

        let result = manager.create_password_reset_token("ghost").await;
        assert!(matches!(result, Err(SessionError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_cleanup_expired_removes_only_dead_records() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let live = manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, Some(Duration::hours(1)))
            .await
            .unwrap();
        manager
            .create_session_token(&user.id, &user.email, TokenKind::Access, Some(Duration::seconds(1)))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let deleted = manager.cleanup_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(manager.auto_login(Some(&live)).await.is_authenticated());
    }

    #[tokio::test]
    async fn test_auto_login_from_cache_clears_on_failure() {
        let (pool, manager) = setup().await;
        let user = create_user(&pool, "u1", "a@example.com").await;

        let cache = MemoryTokenCache::new();
        let token = manager.start_session(&user, false).await.unwrap();
        cache.set(&token).await;

        // Valid token stays cached
        assert!(manager.auto_login_from_cache(&cache).await.is_authenticated());
        assert!(cache.get().await.is_some());

        manager.logout(&user.id).await.unwrap();

        let outcome = manager.auto_login_from_cache(&cache).await;
        assert_eq!(outcome.failure(), Some(AuthFailure::Revoked));
        assert!(cache.get().await.is_none());

        // Empty cache short-circuits to NoToken
        let outcome = manager.auto_login_from_cache(&cache).await;
        assert_eq!(outcome.failure(), Some(AuthFailure::NoToken));
    }
}

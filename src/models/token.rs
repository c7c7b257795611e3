//! Session token and revocation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token kind, which selects both the default time-to-live and the
/// namespaced signing key derived from the root secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived session token (default 24 hours)
    Access,
    /// Long-lived session token for "remember me" (default 30 days)
    Refresh,
    /// Single-use password reset token (default 1 hour)
    Reset,
}

impl TokenKind {
    /// Label mixed into the signing key so that kinds form independent
    /// signing domains: an access token never verifies as a reset token.
    pub fn label(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Reset => "reset",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TokenKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            "reset" => Ok(TokenKind::Reset),
            _ => Err(anyhow::anyhow!("Invalid token kind: {}", s)),
        }
    }
}

/// Signed claims carried inside a session token.
///
/// The signature covers the exact JSON encoding of this struct; the struct
/// is never mutated after issue - a new token is issued instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject user id
    pub user_id: String,
    /// Subject email at issue time (lookup hint only, never trusted as live data)
    pub email: String,
    /// Issue timestamp
    pub issued_at: DateTime<Utc>,
    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Check whether the claims have expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Backing-store row binding a token's hash to its owner and expiry.
///
/// Revocation is a positive lookup: a session token whose hash is absent
/// from the store is treated as revoked even if its signature and expiry
/// are otherwise valid.
#[derive(Debug, Clone)]
pub struct RevocationRecord {
    /// Row id (0 until inserted)
    pub id: i64,
    /// Owning user id
    pub user_id: String,
    /// SHA-256 hex digest of the full token string (unique)
    pub token_hash: String,
    /// Token kind
    pub kind: TokenKind,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp (cleanup purges rows past this)
    pub expires_at: DateTime<Utc>,
}

/// Authentication audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    Login,
    Logout,
    AutoLoginFailed,
    ResetIssued,
    ResetConsumed,
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthEventKind::Login => "login",
            AuthEventKind::Logout => "logout",
            AuthEventKind::AutoLoginFailed => "auto_login_failed",
            AuthEventKind::ResetIssued => "reset_issued",
            AuthEventKind::ResetConsumed => "reset_consumed",
        };
        f.write_str(s)
    }
}

/// Audit row recorded best-effort for security review.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub id: i64,
    pub user_id: String,
    pub event_type: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(user_id: impl Into<String>, kind: AuthEventKind, detail: Option<String>) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            event_type: kind.to_string(),
            detail,
            created_at: Utc::now(),
        }
    }
}

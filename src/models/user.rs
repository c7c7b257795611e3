//! User model
//!
//! The session manager reads user records to confirm an account still exists
//! and is active before restoring a session; it does not own their lifecycle
//! beyond registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity representing a registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID v4, stored as string)
    pub id: String,
    /// Email address (unique, lowercased)
    pub email: String,
    /// Password hash (argon2id)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name
    pub full_name: String,
    /// Administrator flag
    pub is_admin: bool,
    /// Whether the account can log in
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful login, if any
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new User with a fresh UUID.
    ///
    /// The password must already be hashed; use
    /// `services::password::hash_password()`.
    pub fn new(email: String, password_hash: String, full_name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            full_name,
            is_admin: false,
            is_active: true,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new_defaults() {
        let user = User::new(
            "test@example.com".to_string(),
            "hashed".to_string(),
            "Test User".to_string(),
        );

        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.full_name, "Test User");
        assert!(!user.is_admin);
        assert!(user.is_active);
        assert!(user.last_login_at.is_none());
    }

    #[test]
    fn test_user_ids_are_unique() {
        let a = User::new("a@x.com".into(), "h".into(), "A".into());
        let b = User::new("b@x.com".into(), "h".into(), "B".into());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a@x.com".into(), "secret-hash".into(), "A".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}

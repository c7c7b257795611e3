//! Token repository
//!
//! Database operations for the `auth_tokens` table, which holds one row per
//! live session or reset token. Presence of a token's hash here is what
//! keeps the token valid; deleting the row revokes it.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{RevocationRecord, TokenKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Token repository trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Record a newly issued token
    async fn insert(&self, record: &RevocationRecord) -> Result<()>;

    /// Look up a token record by its hash
    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RevocationRecord>>;

    /// Delete a single token record by its hash. Returns true if a row
    /// was deleted.
    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool>;

    /// Delete all of a user's tokens of the given kinds. Returns the
    /// number of rows deleted.
    async fn delete_by_user(&self, user_id: &str, kinds: &[TokenKind]) -> Result<i64>;

    /// Delete all records whose expiry has passed. Returns the number of
    /// rows deleted.
    async fn delete_expired(&self) -> Result<i64>;
}

/// SQLx-based token repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenRepository {
    /// Create a new SQLx token repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn insert(&self, record: &RevocationRecord) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_token_sqlite(self.pool.as_sqlite().unwrap(), record).await
            }
            DatabaseDriver::Mysql => {
                insert_token_mysql(self.pool.as_mysql().unwrap(), record).await
            }
        }
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RevocationRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_token_by_hash_sqlite(self.pool.as_sqlite().unwrap(), token_hash).await
            }
            DatabaseDriver::Mysql => {
                get_token_by_hash_mysql(self.pool.as_mysql().unwrap(), token_hash).await
            }
        }
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_token_by_hash_sqlite(self.pool.as_sqlite().unwrap(), token_hash).await
            }
            DatabaseDriver::Mysql => {
                delete_token_by_hash_mysql(self.pool.as_mysql().unwrap(), token_hash).await
            }
        }
    }

    async fn delete_by_user(&self, user_id: &str, kinds: &[TokenKind]) -> Result<i64> {
        let mut deleted = 0;
        for kind in kinds {
            deleted += match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    delete_tokens_by_user_sqlite(self.pool.as_sqlite().unwrap(), user_id, *kind)
                        .await?
                }
                DatabaseDriver::Mysql => {
                    delete_tokens_by_user_mysql(self.pool.as_mysql().unwrap(), user_id, *kind)
                        .await?
                }
            };
        }
        Ok(deleted)
    }

    async fn delete_expired(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_expired_tokens_sqlite(self.pool.as_sqlite().unwrap()).await
            }
            DatabaseDriver::Mysql => {
                delete_expired_tokens_mysql(self.pool.as_mysql().unwrap()).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_token_sqlite(pool: &SqlitePool, record: &RevocationRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_tokens (user_id, token_hash, token_kind, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.token_hash)
    .bind(record.kind.label())
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(pool)
    .await
    .context("Failed to insert token record")?;

    Ok(())
}

async fn get_token_by_hash_sqlite(
    pool: &SqlitePool,
    token_hash: &str,
) -> Result<Option<RevocationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, token_hash, token_kind, created_at, expires_at
        FROM auth_tokens
        WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .context("Failed to get token by hash")?;

    match row {
        Some(row) => Ok(Some(row_to_record_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn delete_token_by_hash_sqlite(pool: &SqlitePool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await
        .context("Failed to delete token by hash")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_tokens_by_user_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    kind: TokenKind,
) -> Result<i64> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = ? AND token_kind = ?")
        .bind(user_id)
        .bind(kind.label())
        .execute(pool)
        .await
        .context("Failed to delete tokens by user")?;

    Ok(result.rows_affected() as i64)
}

async fn delete_expired_tokens_sqlite(pool: &SqlitePool) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired tokens")?;

    Ok(result.rows_affected() as i64)
}

fn row_to_record_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<RevocationRecord> {
    let kind_str: String = row.get("token_kind");
    Ok(RevocationRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        kind: TokenKind::from_str(&kind_str)?,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_token_mysql(pool: &MySqlPool, record: &RevocationRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_tokens (user_id, token_hash, token_kind, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.token_hash)
    .bind(record.kind.label())
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(pool)
    .await
    .context("Failed to insert token record")?;

    Ok(())
}

async fn get_token_by_hash_mysql(
    pool: &MySqlPool,
    token_hash: &str,
) -> Result<Option<RevocationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, token_hash, token_kind, created_at, expires_at
        FROM auth_tokens
        WHERE token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .context("Failed to get token by hash")?;

    match row {
        Some(row) => Ok(Some(row_to_record_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn delete_token_by_hash_mysql(pool: &MySqlPool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await
        .context("Failed to delete token by hash")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_tokens_by_user_mysql(
    pool: &MySqlPool,
    user_id: &str,
    kind: TokenKind,
) -> Result<i64> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = ? AND token_kind = ?")
        .bind(user_id)
        .bind(kind.label())
        .execute(pool)
        .await
        .context("Failed to delete tokens by user")?;

    Ok(result.rows_affected() as i64)
}

async fn delete_expired_tokens_mysql(pool: &MySqlPool) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired tokens")?;

    Ok(result.rows_affected() as i64)
}

fn row_to_record_mysql(row: &sqlx::mysql::MySqlRow) -> Result<RevocationRecord> {
    let kind_str: String = row.get("token_kind");
    let created_at: DateTime<Utc> = row.get("created_at");
    let expires_at: DateTime<Utc> = row.get("expires_at");

    Ok(RevocationRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token_hash: row.get("token_hash"),
        kind: TokenKind::from_str(&kind_str)?,
        created_at,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTokenRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTokenRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &DynDatabasePool, id: &str) {
        let sqlite_pool = pool.as_sqlite().unwrap();
        sqlx::query("INSERT INTO users (id, email, password_hash) VALUES (?, ?, ?)")
            .bind(id)
            .bind(format!("{}@example.com", id))
            .bind("hash")
            .execute(sqlite_pool)
            .await
            .expect("Failed to create test user");
    }

    fn record(user_id: &str, hash: &str, kind: TokenKind, hours: i64) -> RevocationRecord {
        let now = Utc::now();
        RevocationRecord {
            id: 0,
            user_id: user_id.to_string(),
            token_hash: hash.to_string(),
            kind,
            created_at: now,
            expires_at: now + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_by_hash() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        repo.insert(&record("u1", "hash-a", TokenKind::Access, 24))
            .await
            .expect("Failed to insert");

        let found = repo
            .get_by_hash("hash-a")
            .await
            .expect("Failed to get")
            .expect("Record not found");
        assert_eq!(found.user_id, "u1");
        assert_eq!(found.kind, TokenKind::Access);
        assert!(found.id > 0);
    }

    #[tokio::test]
    async fn test_get_by_hash_not_found() {
        let (_pool, repo) = setup_test_repo().await;
        let found = repo.get_by_hash("nope").await.expect("Failed to get");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        repo.insert(&record("u1", "dup", TokenKind::Access, 24))
            .await
            .expect("Failed to insert");
        let result = repo.insert(&record("u1", "dup", TokenKind::Refresh, 24)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_hash() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        repo.insert(&record("u1", "hash-a", TokenKind::Access, 24))
            .await
            .unwrap();

        assert!(repo.delete_by_hash("hash-a").await.unwrap());
        assert!(repo.get_by_hash("hash-a").await.unwrap().is_none());

        // Deleting again is a no-op
        assert!(!repo.delete_by_hash("hash-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_user_scopes_kind_and_user() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;
        create_test_user(&pool, "u2").await;

        repo.insert(&record("u1", "a1", TokenKind::Access, 24)).await.unwrap();
        repo.insert(&record("u1", "r1", TokenKind::Refresh, 24)).await.unwrap();
        repo.insert(&record("u1", "p1", TokenKind::Reset, 1)).await.unwrap();
        repo.insert(&record("u2", "a2", TokenKind::Access, 24)).await.unwrap();

        let deleted = repo
            .delete_by_user("u1", &[TokenKind::Access, TokenKind::Refresh])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        // Reset token and the other user's token survive
        assert!(repo.get_by_hash("p1").await.unwrap().is_some());
        assert!(repo.get_by_hash("a2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, "u1").await;

        repo.insert(&record("u1", "live", TokenKind::Access, 24)).await.unwrap();
        repo.insert(&record("u1", "dead", TokenKind::Access, -1)).await.unwrap();

        let deleted = repo.delete_expired().await.unwrap();
        assert_eq!(deleted, 1);

        assert!(repo.get_by_hash("live").await.unwrap().is_some());
        assert!(repo.get_by_hash("dead").await.unwrap().is_none());
    }
}

//! User repository
//!
//! Database operations for user accounts. The session layer only ever reads
//! through `get_by_id`; the rest supports registration and login.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Get user by email (expects a lowercased email)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Record a successful login timestamp
    async fn touch_last_login(&self, id: &str) -> Result<()>;

    /// Replace the stored password hash
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<()>;

    /// Count all users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.as_sqlite().unwrap(), user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.as_mysql().unwrap(), user).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.as_mysql().unwrap(), id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_email_sqlite(self.pool.as_sqlite().unwrap(), email).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_email_mysql(self.pool.as_mysql().unwrap(), email).await
            }
        }
    }

    async fn touch_last_login(&self, id: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                touch_last_login_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                touch_last_login_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_password_sqlite(self.pool.as_sqlite().unwrap(), id, password_hash).await
            }
            DatabaseDriver::Mysql => {
                update_password_mysql(self.pool.as_mysql().unwrap(), id, password_hash).await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.as_sqlite().unwrap()).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.as_mysql().unwrap()).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.is_admin)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.last_login_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(user.clone())
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    match row {
        Some(row) => Ok(Some(row_to_user_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn touch_last_login_sqlite(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update last login")?;

    Ok(())
}

async fn update_password_sqlite(pool: &SqlitePool, id: &str, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;

    Ok(())
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        is_admin: row.get("is_admin"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.is_admin)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.last_login_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(user.clone())
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, password_hash, full_name, is_admin, is_active, created_at, last_login_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    match row {
        Some(row) => Ok(Some(row_to_user_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn touch_last_login_mysql(pool: &MySqlPool, id: &str) -> Result<()> {
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update last login")?;

    Ok(())
}

async fn update_password_mysql(pool: &MySqlPool, id: &str, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;

    Ok(())
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let created_at: DateTime<Utc> = row.get("created_at");
    let last_login_at: Option<DateTime<Utc>> = row.get("last_login_at");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        is_admin: row.get("is_admin"),
        is_active: row.get("is_active"),
        created_at,
        last_login_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(email: &str) -> User {
        User::new(email.to_string(), "hash".to_string(), "Test User".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get_by_id() {
        let repo = setup_test_repo().await;

        let user = test_user("a@example.com");
        repo.create(&user).await.expect("Failed to create user");

        let found = repo
            .get_by_id(&user.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(found.email, "a@example.com");
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn test_get_by_email() {
        let repo = setup_test_repo().await;

        let user = test_user("b@example.com");
        repo.create(&user).await.expect("Failed to create user");

        let found = repo
            .get_by_email("b@example.com")
            .await
            .expect("Failed to get user")
            .expect("User not found");
        assert_eq!(found.id, user.id);

        let missing = repo.get_by_email("missing@example.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;

        repo.create(&test_user("dup@example.com")).await.unwrap();
        let result = repo.create(&test_user("dup@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_touch_last_login() {
        let repo = setup_test_repo().await;

        let user = test_user("c@example.com");
        repo.create(&user).await.unwrap();
        assert!(repo.get_by_id(&user.id).await.unwrap().unwrap().last_login_at.is_none());

        repo.touch_last_login(&user.id).await.unwrap();
        assert!(repo.get_by_id(&user.id).await.unwrap().unwrap().last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_update_password() {
        let repo = setup_test_repo().await;

        let user = test_user("e@example.com");
        repo.create(&user).await.unwrap();

        repo.update_password(&user.id, "new-hash").await.unwrap();
        let reloaded = repo.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_count() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        repo.create(&test_user("d@example.com")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}

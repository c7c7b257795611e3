//! Audit repository
//!
//! Append-only access to the `auth_events` table. Callers treat writes as
//! best-effort; an audit failure never blocks the authentication flow.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Audit repository trait
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an authentication event
    async fn record(&self, event: &AuthEvent) -> Result<()>;

    /// List recent events for a user, newest first
    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<AuthEvent>>;
}

/// SQLx-based audit repository implementation
pub struct SqlxAuditRepository {
    pool: DynDatabasePool,
}

impl SqlxAuditRepository {
    /// Create a new SQLx audit repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuditRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuditRepository for SqlxAuditRepository {
    async fn record(&self, event: &AuthEvent) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                record_event_sqlite(self.pool.as_sqlite().unwrap(), event).await
            }
            DatabaseDriver::Mysql => {
                record_event_mysql(self.pool.as_mysql().unwrap(), event).await
            }
        }
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<AuthEvent>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_events_by_user_sqlite(self.pool.as_sqlite().unwrap(), user_id, limit).await
            }
            DatabaseDriver::Mysql => {
                list_events_by_user_mysql(self.pool.as_mysql().unwrap(), user_id, limit).await
            }
        }
    }
}

async fn record_event_sqlite(pool: &SqlitePool, event: &AuthEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_events (user_id, event_type, detail, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&event.user_id)
    .bind(&event.event_type)
    .bind(&event.detail)
    .bind(event.created_at)
    .execute(pool)
    .await
    .context("Failed to record auth event")?;

    Ok(())
}

async fn list_events_by_user_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<AuthEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, event_type, detail, created_at
        FROM auth_events
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list auth events")?;

    let mut events = Vec::new();
    for row in rows {
        events.push(AuthEvent {
            id: row.get("id"),
            user_id: row.get("user_id"),
            event_type: row.get("event_type"),
            detail: row.get("detail"),
            created_at: row.get("created_at"),
        });
    }

    Ok(events)
}

async fn record_event_mysql(pool: &MySqlPool, event: &AuthEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auth_events (user_id, event_type, detail, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&event.user_id)
    .bind(&event.event_type)
    .bind(&event.detail)
    .bind(event.created_at)
    .execute(pool)
    .await
    .context("Failed to record auth event")?;

    Ok(())
}

async fn list_events_by_user_mysql(
    pool: &MySqlPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<AuthEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, event_type, detail, created_at
        FROM auth_events
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list auth events")?;

    let mut events = Vec::new();
    for row in rows {
        let created_at: DateTime<Utc> = row.get("created_at");
        events.push(AuthEvent {
            id: row.get("id"),
            user_id: row.get("user_id"),
            event_type: row.get("event_type"),
            detail: row.get("detail"),
            created_at,
        });
    }

    Ok(events)
}

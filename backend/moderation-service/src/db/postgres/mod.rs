//! Postgres-backed store.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use std::time::Duration;

use super::StoreHealth;
use crate::config::Config;
use crate::error::{ModerationError, Result};
use crate::models::DateRange;

mod appeals;
mod flags;
mod queue;
mod reports;

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| ModerationError::Internal(format!("migration failed: {}", e)))?;
        Ok(())
    }
}

pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| ModerationError::Config("DATABASE_URL is not set".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database pool initialized"
    );
    Ok(pool)
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}

/// Appends `AND created_at` bounds for a date range.
fn push_date_range(qb: &mut QueryBuilder<'_, Postgres>, column: &str, range: DateRange) {
    if let Some(from) = range.from {
        qb.push(format!(" AND {} >= ", column)).push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(format!(" AND {} < ", column)).push_bind(to);
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

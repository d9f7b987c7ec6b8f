use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config;

/// Errors from the persistence layer.
///
/// `Unavailable` and `ConfigMissing` mean the store cannot be reached at all
/// and map to retryable 503s; `NotFound` is an ordinary miss.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a query-time error: transport-level failures count as
    /// unavailability so they surface as retryable 503s instead of generic
    /// 500s.
    pub fn from_query(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Sqlx(other),
        }
    }
}

static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Get the shared connection pool, connecting lazily on first use.
///
/// Tenancy in this service is row-scoped by tenant key, so a single
/// database (and a single pool) serves every tenant.
pub async fn pool() -> Result<PgPool, StoreError> {
    let pool = POOL
        .get_or_try_init(|| async {
            let url = std::env::var("DATABASE_URL")
                .map_err(|_| StoreError::ConfigMissing("DATABASE_URL"))?;

            let cfg = &config::config().database;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
                .connect(&url)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

            info!("Created database pool");
            Ok::<PgPool, StoreError>(pool)
        })
        .await?;

    Ok(pool.clone())
}

/// Pings the pool to ensure connectivity
pub async fn health_check() -> Result<(), StoreError> {
    let pool = pool().await?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Ok(())
}

/// Schema bootstrap statements. The unique index on tenant_key is what makes
/// concurrent first-time settings provisioning idempotent: the losing insert
/// conflicts and re-reads the winner.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS widget_settings (
        id UUID PRIMARY KEY,
        tenant_key TEXT NOT NULL,
        instance_id TEXT,
        comp_id TEXT,
        entitlement_tier TEXT NOT NULL DEFAULT 'free',
        preferences JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS widget_settings_tenant_key_idx ON widget_settings (tenant_key)",
    "CREATE INDEX IF NOT EXISTS widget_settings_instance_idx ON widget_settings (instance_id)",
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        tenant_key TEXT NOT NULL,
        instance_id TEXT,
        comp_id TEXT,
        title TEXT NOT NULL,
        starts_at TIMESTAMPTZ,
        ends_at TIMESTAMPTZ,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS events_tenant_key_idx ON events (tenant_key)",
    "CREATE INDEX IF NOT EXISTS events_instance_idx ON events (instance_id, comp_id)",
    r#"
    CREATE TABLE IF NOT EXISTS plans (
        id UUID PRIMARY KEY,
        tenant_key TEXT NOT NULL,
        instance_id TEXT,
        comp_id TEXT,
        title TEXT NOT NULL,
        description TEXT,
        sessions JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS plans_tenant_key_idx ON plans (tenant_key)",
    r#"
    CREATE TABLE IF NOT EXISTS registrations (
        id UUID PRIMARY KEY,
        tenant_key TEXT NOT NULL,
        event_id UUID NOT NULL,
        attendee JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL DEFAULT 'confirmed',
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS registrations_tenant_key_idx ON registrations (tenant_key)",
    "CREATE INDEX IF NOT EXISTS registrations_event_idx ON registrations (event_id)",
];

/// Create tables and indexes if they do not exist yet.
pub async fn ensure_schema() -> Result<(), StoreError> {
    let pool = pool().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    info!("Schema bootstrap complete");
    Ok(())
}

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::database::{self, StoreError};
use crate::identity::EntitlementTier;
use crate::settings::SettingsRecord;

/// Persistence seam for settings records. The resolver only ever talks to
/// this trait, which keeps the fallback chain testable without a database.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn find_by_tenant_key(
        &self,
        tenant_key: &str,
    ) -> Result<Option<SettingsRecord>, StoreError>;

    /// Any record for the site, regardless of widget. Used to inherit the
    /// entitlement tier when provisioning a sibling widget.
    async fn find_any_by_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<SettingsRecord>, StoreError>;

    /// Atomic find-or-create keyed on the tenant key. Under a concurrent
    /// first-request race exactly one record wins; the loser gets the
    /// winner's row back.
    async fn insert_if_absent(
        &self,
        record: SettingsRecord,
    ) -> Result<SettingsRecord, StoreError>;

    async fn update(&self, record: &SettingsRecord) -> Result<SettingsRecord, StoreError>;
}

const SELECT_COLUMNS: &str = "id, tenant_key, instance_id, comp_id, entitlement_tier, \
     preferences, created_at, updated_at";

/// Postgres-backed settings store. Holds no state of its own; the pool is
/// acquired lazily per operation so anonymous traffic never touches the
/// database at all.
pub struct PgSettingsStore;

impl PgSettingsStore {
    pub fn new() -> Self {
        Self
    }

    fn record_from_row(row: &PgRow) -> SettingsRecord {
        SettingsRecord {
            id: Some(row.get("id")),
            tenant_key: row.get("tenant_key"),
            instance_id: row.get("instance_id"),
            comp_id: row.get("comp_id"),
            entitlement_tier: EntitlementTier::from_label(
                row.get::<String, _>("entitlement_tier").as_str(),
            ),
            preferences: row.get("preferences"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl Default for PgSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn find_by_tenant_key(
        &self,
        tenant_key: &str,
    ) -> Result<Option<SettingsRecord>, StoreError> {
        let pool = database::pool().await?;
        let sql = format!(
            "SELECT {} FROM widget_settings WHERE tenant_key = $1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(tenant_key)
            .fetch_optional(&pool)
            .await
            .map_err(StoreError::from_query)?;
        Ok(row.map(|r| Self::record_from_row(&r)))
    }

    async fn find_any_by_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<SettingsRecord>, StoreError> {
        let pool = database::pool().await?;
        // Oldest record wins so the inherited tier is stable regardless of
        // which sibling asks
        let sql = format!(
            "SELECT {} FROM widget_settings WHERE instance_id = $1 ORDER BY created_at ASC LIMIT 1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(instance_id)
            .fetch_optional(&pool)
            .await
            .map_err(StoreError::from_query)?;
        Ok(row.map(|r| Self::record_from_row(&r)))
    }

    async fn insert_if_absent(
        &self,
        record: SettingsRecord,
    ) -> Result<SettingsRecord, StoreError> {
        let pool = database::pool().await?;
        let id = record.id.unwrap_or_else(Uuid::new_v4);

        let result = sqlx::query(
            r#"
            INSERT INTO widget_settings
                (id, tenant_key, instance_id, comp_id, entitlement_tier, preferences, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_key) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&record.tenant_key)
        .bind(&record.instance_id)
        .bind(&record.comp_id)
        .bind(record.entitlement_tier.as_str())
        .bind(&record.preferences)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&pool)
        .await
        .map_err(StoreError::from_query)?;

        if result.rows_affected() == 1 {
            return Ok(SettingsRecord {
                id: Some(id),
                ..record
            });
        }

        // Lost a concurrent first-request race; the winner's row exists now
        self.find_by_tenant_key(&record.tenant_key)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("settings for tenant key {}", record.tenant_key))
            })
    }

    async fn update(&self, record: &SettingsRecord) -> Result<SettingsRecord, StoreError> {
        let id = record
            .id
            .ok_or_else(|| StoreError::NotFound("settings record is not persisted".to_string()))?;

        let pool = database::pool().await?;
        let sql = format!(
            r#"
            UPDATE widget_settings
            SET instance_id = $2,
                comp_id = $3,
                entitlement_tier = $4,
                preferences = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&record.instance_id)
            .bind(&record.comp_id)
            .bind(record.entitlement_tier.as_str())
            .bind(&record.preferences)
            .bind(Utc::now())
            .fetch_optional(&pool)
            .await
            .map_err(StoreError::from_query)?;

        row.map(|r| Self::record_from_row(&r))
            .ok_or_else(|| StoreError::NotFound(format!("settings record {}", id)))
    }
}

use axum::{
    extract::{Extension, Path},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::{self, StoreError};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::tenant::TenantKey;

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub tenant_key: String,
    pub instance_id: Option<String>,
    pub comp_id: Option<String>,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: String,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Opaque to this layer: recurrence, capacity, location, pricing.
    #[serde(default)]
    pub details: Option<Value>,
}

const EVENT_COLUMNS: &str = "id, tenant_key, instance_id, comp_id, title, starts_at, ends_at, \
     details, created_at, updated_at";

/// GET /api/events - events visible to this widget.
///
/// Rows written before the key scheme carry only raw instance/comp columns,
/// hence the fallback arm of the filter.
pub async fn list(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
) -> Result<Json<Value>, ApiError> {
    let pool = database::pool().await?;
    let sql = format!(
        r#"
        SELECT {}
        FROM events
        WHERE tenant_key = $1
           OR (instance_id = $2 AND comp_id IS NOT DISTINCT FROM $3)
        ORDER BY starts_at ASC NULLS LAST, created_at ASC
        "#,
        EVENT_COLUMNS
    );
    let events: Vec<EventRecord> = sqlx::query_as(&sql)
        .bind(tenant_key.as_str())
        .bind(&identity.instance_id)
        .bind(&identity.comp_id)
        .fetch_all(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": events })))
}

/// POST /api/events - create an event for this tenant
pub async fn create(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Json(payload): Json<EventPayload>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO events
            (id, tenant_key, instance_id, comp_id, title, starts_at, ends_at, details, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        EVENT_COLUMNS
    );
    let event: EventRecord = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(tenant_key.as_str())
        .bind(&identity.instance_id)
        .bind(&identity.comp_id)
        .bind(&payload.title)
        .bind(payload.starts_at)
        .bind(payload.ends_at)
        .bind(payload.details.unwrap_or_else(|| json!({})))
        .bind(now)
        .bind(now)
        .fetch_one(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": event })))
}

/// GET /api/events/:id - a single event, scoped to this tenant
pub async fn get_one(
    Extension(tenant_key): Extension<TenantKey>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let pool = database::pool().await?;
    let sql = format!(
        "SELECT {} FROM events WHERE id = $1 AND tenant_key = $2",
        EVENT_COLUMNS
    );
    let event: Option<EventRecord> = sqlx::query_as(&sql)
        .bind(id)
        .bind(tenant_key.as_str())
        .fetch_optional(&pool)
        .await
        .map_err(StoreError::from_query)?;

    match event {
        Some(event) => Ok(Json(json!({ "success": true, "data": event }))),
        None => Err(ApiError::not_found(format!("event {} not found", id))),
    }
}

/// PUT /api/events/:id - replace the mutable fields of an event
pub async fn update(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EventPayload>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let sql = format!(
        r#"
        UPDATE events
        SET title = $3, starts_at = $4, ends_at = $5, details = $6, updated_at = $7
        WHERE id = $1 AND tenant_key = $2
        RETURNING {}
        "#,
        EVENT_COLUMNS
    );
    let event: Option<EventRecord> = sqlx::query_as(&sql)
        .bind(id)
        .bind(tenant_key.as_str())
        .bind(&payload.title)
        .bind(payload.starts_at)
        .bind(payload.ends_at)
        .bind(payload.details.unwrap_or_else(|| json!({})))
        .bind(Utc::now())
        .fetch_optional(&pool)
        .await
        .map_err(StoreError::from_query)?;

    match event {
        Some(event) => Ok(Json(json!({ "success": true, "data": event }))),
        None => Err(ApiError::not_found(format!("event {} not found", id))),
    }
}

/// DELETE /api/events/:id
pub async fn delete(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let result = sqlx::query("DELETE FROM events WHERE id = $1 AND tenant_key = $2")
        .bind(id)
        .bind(tenant_key.as_str())
        .execute(&pool)
        .await
        .map_err(StoreError::from_query)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("event {} not found", id)));
    }

    Ok(Json(json!({ "success": true, "data": { "deleted": id } })))
}

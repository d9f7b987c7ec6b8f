use axum::{
    extract::{Extension, Query},
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
pub struct RegistrationRecord {
    pub id: Uuid,
    pub tenant_key: String,
    pub event_id: Uuid,
    pub attendee: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub event_id: Uuid,
    /// Name, email, phone - opaque to this layer.
    #[serde(default)]
    pub attendee: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationQuery {
    #[serde(default)]
    pub event_id: Option<Uuid>,
}

const REGISTRATION_COLUMNS: &str = "id, tenant_key, event_id, attendee, status, created_at";

/// POST /api/registrations - widget-facing signup for an event.
///
/// The event must belong to this tenant; registering against another
/// tenant's event id is indistinguishable from a missing event.
pub async fn create(
    Extension(tenant_key): Extension<TenantKey>,
    Json(payload): Json<RegistrationPayload>,
) -> Result<Json<Value>, ApiError> {
    let pool = database::pool().await?;

    let event_exists = sqlx::query("SELECT 1 FROM events WHERE id = $1 AND tenant_key = $2")
        .bind(payload.event_id)
        .bind(tenant_key.as_str())
        .fetch_optional(&pool)
        .await
        .map_err(StoreError::from_query)?;
    if event_exists.is_none() {
        return Err(ApiError::not_found(format!(
            "event {} not found",
            payload.event_id
        )));
    }

    let sql = format!(
        r#"
        INSERT INTO registrations (id, tenant_key, event_id, attendee, status, created_at)
        VALUES ($1, $2, $3, $4, 'confirmed', $5)
        RETURNING {}
        "#,
        REGISTRATION_COLUMNS
    );
    let registration: RegistrationRecord = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(tenant_key.as_str())
        .bind(payload.event_id)
        .bind(payload.attendee.unwrap_or_else(|| json!({})))
        .bind(Utc::now())
        .fetch_one(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": registration })))
}

/// GET /api/registrations[?eventId=] - owner-facing listing
pub async fn list(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Query(query): Query<RegistrationQuery>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let sql = format!(
        r#"
        SELECT {}
        FROM registrations
        WHERE tenant_key = $1 AND ($2::uuid IS NULL OR event_id = $2)
        ORDER BY created_at ASC
        "#,
        REGISTRATION_COLUMNS
    );
    let registrations: Vec<RegistrationRecord> = sqlx::query_as(&sql)
        .bind(tenant_key.as_str())
        .bind(query.event_id)
        .fetch_all(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": registrations })))
}

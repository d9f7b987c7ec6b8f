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
pub struct PlanRecord {
    pub id: Uuid,
    pub tenant_key: String,
    pub instance_id: Option<String>,
    pub comp_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub sessions: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered session list; opaque to this layer.
    #[serde(default)]
    pub sessions: Option<Value>,
}

const PLAN_COLUMNS: &str =
    "id, tenant_key, instance_id, comp_id, title, description, sessions, created_at, updated_at";

/// GET /api/plans - yoga plans for this tenant
pub async fn list(
    Extension(tenant_key): Extension<TenantKey>,
) -> Result<Json<Value>, ApiError> {
    let pool = database::pool().await?;
    let sql = format!(
        "SELECT {} FROM plans WHERE tenant_key = $1 ORDER BY created_at ASC",
        PLAN_COLUMNS
    );
    let plans: Vec<PlanRecord> = sqlx::query_as(&sql)
        .bind(tenant_key.as_str())
        .fetch_all(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": plans })))
}

/// POST /api/plans
pub async fn create(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Json(payload): Json<PlanPayload>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO plans
            (id, tenant_key, instance_id, comp_id, title, description, sessions, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        PLAN_COLUMNS
    );
    let plan: PlanRecord = sqlx::query_as(&sql)
        .bind(Uuid::new_v4())
        .bind(tenant_key.as_str())
        .bind(&identity.instance_id)
        .bind(&identity.comp_id)
        .bind(&payload.title)
        .bind(&payload.description)
        .bind(payload.sessions.unwrap_or_else(|| json!([])))
        .bind(now)
        .bind(now)
        .fetch_one(&pool)
        .await
        .map_err(StoreError::from_query)?;

    Ok(Json(json!({ "success": true, "data": plan })))
}

/// DELETE /api/plans/:id
pub async fn delete(
    Extension(identity): Extension<Identity>,
    Extension(tenant_key): Extension<TenantKey>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    identity.require_authenticated()?;

    let pool = database::pool().await?;
    let result = sqlx::query("DELETE FROM plans WHERE id = $1 AND tenant_key = $2")
        .bind(id)
        .bind(tenant_key.as_str())
        .execute(&pool)
        .await
        .map_err(StoreError::from_query)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("plan {} not found", id)));
    }

    Ok(Json(json!({ "success": true, "data": { "deleted": id } })))
}

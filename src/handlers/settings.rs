use axum::{extract::Extension, response::Json};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::identity::Identity;
use crate::settings::store::PgSettingsStore;
use crate::tenant::resolver::SettingsResolver;

/// GET /api/widget/settings - settings bundle for the embedded widget.
///
/// Optional identity: an expired or missing credential still renders the
/// widget, with defaults under the shared default key.
pub async fn widget_get(
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, ApiError> {
    let store = PgSettingsStore::new();
    let resolver = SettingsResolver::new(&store);
    let resolved = resolver.resolve(&identity).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "tenantKey": resolved.tenant_key,
            "identity": identity,
            "settings": resolved.record,
        }
    })))
}

/// GET /api/settings - dashboard read (strict router)
pub async fn get_settings(
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, ApiError> {
    let store = PgSettingsStore::new();
    let resolver = SettingsResolver::new(&store);
    let resolved = resolver.resolve(&identity).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "tenantKey": resolved.tenant_key,
            "settings": resolved.record,
        }
    })))
}

/// PUT /api/settings - dashboard partial update (strict router).
///
/// Only the preference groups present in the payload are overwritten.
pub async fn put_settings(
    Extension(identity): Extension<Identity>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !patch.is_object() {
        return Err(ApiError::bad_request("Settings update must be a JSON object"));
    }

    let store = PgSettingsStore::new();
    let resolver = SettingsResolver::new(&store);
    let resolved = resolver.apply_update(&identity, &patch).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "tenantKey": resolved.tenant_key,
            "settings": resolved.record,
        }
    })))
}

//! Widget settings records.
//!
//! One persisted record per resolved tenant key, provisioned lazily by the
//! resolver. Preference groups are opaque to everything below the handlers;
//! they are stored and returned as JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::identity::EntitlementTier;
use crate::tenant::TenantKey;

pub mod store;

/// A settings document. `id` is `None` for transient records that were never
/// persisted (unauthenticated traffic, or a site key with no legacy row).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub tenant_key: String,
    pub instance_id: Option<String>,
    pub comp_id: Option<String>,
    pub entitlement_tier: EntitlementTier,
    pub preferences: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettingsRecord {
    /// Non-persisted record carrying the global defaults.
    pub fn transient(tenant_key: &TenantKey) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            tenant_key: tenant_key.as_str().to_string(),
            instance_id: None,
            comp_id: None,
            entitlement_tier: EntitlementTier::Free,
            preferences: default_preferences(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh record for first-time provisioning of a widget.
    pub fn provisioned(
        tenant_key: &TenantKey,
        instance_id: &str,
        comp_id: &str,
        entitlement_tier: EntitlementTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Some(Uuid::new_v4()),
            tenant_key: tenant_key.as_str().to_string(),
            instance_id: Some(instance_id.to_string()),
            comp_id: Some(comp_id.to_string()),
            entitlement_tier,
            preferences: default_preferences(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Global default preference groups served to unauthenticated traffic and
/// seeded into newly provisioned records.
pub fn default_preferences() -> Value {
    json!({
        "layout": {
            "view": "grid",
            "eventsPerPage": 9,
            "showFilters": true
        },
        "appearance": {
            "primaryColor": "#7f56d9",
            "secondaryColor": "#f4f1fa",
            "fontFamily": "inherit",
            "darkMode": false
        },
        "calendar": {
            "defaultView": "month",
            "weekStartsOn": "monday",
            "timeFormat": "24h"
        },
        "behavior": {
            "clickAction": "tooltip",
            "allowGuestRegistration": true,
            "showWaitlist": false
        }
    })
}

/// Merge a partial update into stored preferences. Objects merge key-wise
/// and recursively; scalars and arrays replace. Groups and keys not present
/// in the patch keep their stored values.
pub fn merge_preferences(base: &mut Value, patch: &Value) {
    if let Value::Object(patch_map) = patch {
        if let Value::Object(base_map) = base {
            for (key, patch_value) in patch_map {
                if let Some(base_value) = base_map.get_mut(key) {
                    if base_value.is_object() && patch_value.is_object() {
                        merge_preferences(base_value, patch_value);
                        continue;
                    }
                }
                base_map.insert(key.clone(), patch_value.clone());
            }
            return;
        }
    }
    *base = patch.clone();
}

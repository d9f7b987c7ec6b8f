//! Tenant key derivation.
//!
//! The tenant key is the partition key for every persisted collection. It is
//! a pure function of the request identity and must be stable across requests
//! and process restarts.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

pub mod resolver;

/// Key shared by all unauthenticated and local-development traffic.
pub const DEFAULT_TENANT_KEY: &str = "default";

const KEY_SEPARATOR: &str = "::";

/// Opaque, deterministic partition key derived from `(instanceId, compId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantKey(String);

impl TenantKey {
    /// Derive the key for a request identity:
    /// - no instance id: the shared default key, whatever else the request
    ///   carried;
    /// - instance and component: `instance::comp`, one key per widget;
    /// - instance only: the bare instance id, one key per site. Never equal
    ///   to a per-widget key of the same instance since those always append
    ///   a non-empty component.
    pub fn for_identity(identity: &Identity) -> Self {
        match (identity.instance_id.as_deref(), identity.comp_id.as_deref()) {
            (None, _) => Self::default_key(),
            (Some(instance_id), Some(comp_id)) => Self::for_widget(instance_id, comp_id),
            (Some(instance_id), None) => Self::for_instance(instance_id),
        }
    }

    pub fn for_widget(instance_id: &str, comp_id: &str) -> Self {
        TenantKey(format!("{}{}{}", instance_id, KEY_SEPARATOR, comp_id))
    }

    pub fn for_instance(instance_id: &str) -> Self {
        TenantKey(instance_id.to_string())
    }

    pub fn default_key() -> Self {
        TenantKey(DEFAULT_TENANT_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_TENANT_KEY
    }
}

impl AsRef<str> for TenantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

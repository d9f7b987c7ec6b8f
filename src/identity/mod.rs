//! Per-request identity.
//!
//! One explicit value object built once by the identity middleware and passed
//! to handlers through request extensions. Handlers never reach back into
//! headers or query strings for tenancy information.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{self, AppConfig};
use crate::error::ApiError;

/// Header carrying the widget component id.
pub const COMP_ID_HEADER: &str = "x-wix-comp-id";

/// Query parameters carrying the component id, primary name first. The later
/// names are legacy spellings still sent by old widget bundles.
pub const COMP_ID_QUERY_PARAMS: &[&str] = &["compId", "comp_id", "origCompId"];

/// Last-resort body field for the component id.
pub const COMP_ID_BODY_FIELD: &str = "compId";

/// Subscription tier attached to an authenticated instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntitlementTier {
    Free,
    Light,
    Business,
    Other(String),
}

impl EntitlementTier {
    /// Tier from the vendorProductId claim. Free sites carry no product.
    pub fn from_vendor_product(product: Option<&str>) -> Self {
        match product {
            None => EntitlementTier::Free,
            Some(p) => Self::from_label(p),
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "free" => EntitlementTier::Free,
            "light" => EntitlementTier::Light,
            "business" => EntitlementTier::Business,
            other => EntitlementTier::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntitlementTier::Free => "free",
            EntitlementTier::Light => "light",
            EntitlementTier::Business => "business",
            EntitlementTier::Other(s) => s,
        }
    }

    pub fn is_free(&self) -> bool {
        *self == EntitlementTier::Free
    }
}

impl Default for EntitlementTier {
    fn default() -> Self {
        EntitlementTier::Free
    }
}

impl From<String> for EntitlementTier {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<EntitlementTier> for String {
    fn from(tier: EntitlementTier) -> Self {
        tier.as_str().to_string()
    }
}

impl std::fmt::Display for EntitlementTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity recovered from one inbound request.
///
/// `comp_id` without `instance_id` is legal (editor preview serves widgets
/// before the site is published); `instance_id` without `comp_id` is legal
/// for tenant-wide dashboard operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub instance_id: Option<String>,
    pub comp_id: Option<String>,
    pub entitlement_tier: EntitlementTier,
}

impl Identity {
    pub fn anonymous(comp_id: Option<String>) -> Self {
        Self {
            instance_id: None,
            comp_id,
            entitlement_tier: EntitlementTier::Free,
        }
    }

    pub fn authenticated(
        instance_id: String,
        entitlement_tier: EntitlementTier,
        comp_id: Option<String>,
    ) -> Self {
        Self {
            instance_id: Some(instance_id),
            comp_id,
            entitlement_tier,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.instance_id.is_some()
    }

    /// Strict-mode gate: reject unauthenticated callers unless the dev bypass
    /// is enabled outside production.
    pub fn require_authenticated(&self) -> Result<(), ApiError> {
        self.require_authenticated_with(config::config())
    }

    pub(crate) fn require_authenticated_with(&self, cfg: &AppConfig) -> Result<(), ApiError> {
        if self.instance_id.is_some() {
            return Ok(());
        }
        if cfg.wix.allow_unauthenticated && !cfg.is_production() {
            return Ok(());
        }
        Err(ApiError::unauthorized("Authentication required"))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Recover the component id: header, then query (primary name, then legacy
/// spellings), then body field. First non-empty value wins; whitespace-only
/// values count as absent. Conflicting sources are never an error.
pub fn comp_id_from_sources(
    headers: &HeaderMap,
    query_pairs: &[(String, String)],
    body: Option<&Value>,
) -> Option<String> {
    if let Some(comp_id) = headers
        .get(COMP_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_empty)
    {
        return Some(comp_id);
    }

    for name in COMP_ID_QUERY_PARAMS {
        let found = query_pairs
            .iter()
            .find(|(key, _)| key.as_str() == *name)
            .and_then(|(_, value)| non_empty(value));
        if let Some(comp_id) = found {
            return Some(comp_id);
        }
    }

    body.and_then(|b| b.get(COMP_ID_BODY_FIELD))
        .and_then(Value::as_str)
        .and_then(non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, Environment, WixConfig};
    use serde_json::json;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_wins_over_query_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert(COMP_ID_HEADER, "from-header".parse().unwrap());
        let query = pairs(&[("compId", "from-query")]);
        let body = json!({ "compId": "from-body" });

        assert_eq!(
            comp_id_from_sources(&headers, &query, Some(&body)),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn query_primary_name_wins_over_legacy_names() {
        let headers = HeaderMap::new();
        let query = pairs(&[("origCompId", "legacy"), ("compId", "primary")]);

        assert_eq!(
            comp_id_from_sources(&headers, &query, None),
            Some("primary".to_string())
        );
    }

    #[test]
    fn legacy_query_names_are_checked_in_order() {
        let headers = HeaderMap::new();
        let query = pairs(&[("origCompId", "older"), ("comp_id", "old")]);

        assert_eq!(
            comp_id_from_sources(&headers, &query, None),
            Some("old".to_string())
        );
    }

    #[test]
    fn body_is_the_last_resort() {
        let headers = HeaderMap::new();
        let body = json!({ "compId": "from-body" });

        assert_eq!(
            comp_id_from_sources(&headers, &[], Some(&body)),
            Some("from-body".to_string())
        );
    }

    #[test]
    fn whitespace_only_values_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COMP_ID_HEADER, "   ".parse().unwrap());
        let query = pairs(&[("compId", "")]);
        let body = json!({ "compId": "  widget-1  " });

        // Header and query are effectively absent; the body value is trimmed
        assert_eq!(
            comp_id_from_sources(&headers, &query, Some(&body)),
            Some("widget-1".to_string())
        );
    }

    #[test]
    fn absent_everywhere_is_none() {
        assert_eq!(comp_id_from_sources(&HeaderMap::new(), &[], None), None);
    }

    #[test]
    fn tier_mapping() {
        assert_eq!(
            EntitlementTier::from_vendor_product(None),
            EntitlementTier::Free
        );
        assert_eq!(
            EntitlementTier::from_vendor_product(Some("Light")),
            EntitlementTier::Light
        );
        assert_eq!(
            EntitlementTier::from_vendor_product(Some("business")),
            EntitlementTier::Business
        );
        assert_eq!(
            EntitlementTier::from_vendor_product(Some("studio-plus")),
            EntitlementTier::Other("studio-plus".to_string())
        );
    }

    #[test]
    fn tier_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_value(EntitlementTier::Business).unwrap(),
            json!("business")
        );
        let parsed: EntitlementTier = serde_json::from_value(json!("light")).unwrap();
        assert_eq!(parsed, EntitlementTier::Light);
    }

    fn strict_config(environment: Environment, allow_unauthenticated: bool) -> AppConfig {
        AppConfig {
            environment,
            database: DatabaseConfig {
                max_connections: 1,
                acquire_timeout_secs: 1,
            },
            wix: WixConfig {
                app_id: String::new(),
                app_secret: String::new(),
                allow_unauthenticated,
                token_cache_ttl_secs: 0,
            },
        }
    }

    #[test]
    fn strict_mode_rejects_anonymous_in_production() {
        let identity = Identity::anonymous(Some("widget-1".to_string()));
        let cfg = strict_config(Environment::Production, true);
        assert!(identity.require_authenticated_with(&cfg).is_err());
    }

    #[test]
    fn strict_mode_allows_dev_bypass() {
        let identity = Identity::anonymous(None);
        let cfg = strict_config(Environment::Development, true);
        assert!(identity.require_authenticated_with(&cfg).is_ok());
    }

    #[test]
    fn strict_mode_allows_authenticated() {
        let identity =
            Identity::authenticated("site-1".to_string(), EntitlementTier::Free, None);
        let cfg = strict_config(Environment::Production, false);
        assert!(identity.require_authenticated_with(&cfg).is_ok());
    }
}

//! Settings location and lazy provisioning.
//!
//! Resolution is total: every request gets a settings object back, persisted
//! or transient. There is exactly one fallback order; the historical
//! variants (compId-first lookup, unconditional create) are gone on purpose,
//! they were the source of duplicate records.

use serde_json::Value;
use tracing::debug;

use crate::database::StoreError;
use crate::identity::Identity;
use crate::settings::store::SettingsStore;
use crate::settings::{merge_preferences, SettingsRecord};
use crate::tenant::TenantKey;

/// Result of a resolution. `tenant_key` is always the key computed from the
/// identity, even when the settings document came from a fallback step; data
/// access downstream partitions on it verbatim.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub tenant_key: TenantKey,
    pub record: SettingsRecord,
    /// True when this request provisioned the record.
    pub created: bool,
}

pub struct SettingsResolver<'a> {
    store: &'a dyn SettingsStore,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self { store }
    }

    /// Locate or create the settings record for an identity.
    ///
    /// Ordered chain, each step only if the previous found nothing:
    /// 1. exact match on the computed key;
    /// 2. if a compId was supplied, the instance-only key (legacy shared
    ///    settings);
    /// 3. with both ids present, auto-create under the exact key, tier
    ///    inherited from any record of the same instance, else free;
    /// 4. otherwise a transient default record.
    pub async fn resolve(&self, identity: &Identity) -> Result<ResolvedSettings, StoreError> {
        let tenant_key = TenantKey::for_identity(identity);

        let Some(instance_id) = identity.instance_id.as_deref() else {
            // All unauthenticated traffic shares one transient default
            // bundle; no store round-trip
            return Ok(ResolvedSettings {
                record: SettingsRecord::transient(&tenant_key),
                tenant_key,
                created: false,
            });
        };

        if let Some(record) = self.store.find_by_tenant_key(tenant_key.as_str()).await? {
            return Ok(ResolvedSettings {
                tenant_key,
                record,
                created: false,
            });
        }

        if let Some(comp_id) = identity.comp_id.as_deref() {
            // Legacy shared-settings compatibility: a site-wide record may
            // predate per-widget keys
            let site_key = TenantKey::for_instance(instance_id);
            if let Some(record) = self.store.find_by_tenant_key(site_key.as_str()).await? {
                debug!(
                    tenant_key = tenant_key.as_str(),
                    "serving site-wide settings for widget without its own record"
                );
                return Ok(ResolvedSettings {
                    tenant_key,
                    record,
                    created: false,
                });
            }

            // First request for this widget: provision. The tier comes from
            // any sibling widget on the same site, so a plan upgrade is
            // visible across the site's widgets.
            let inherited_tier = self
                .store
                .find_any_by_instance(instance_id)
                .await?
                .map(|sibling| sibling.entitlement_tier)
                .unwrap_or_default();

            let fresh =
                SettingsRecord::provisioned(&tenant_key, instance_id, comp_id, inherited_tier);
            let record = self.store.insert_if_absent(fresh).await?;
            debug!(tenant_key = tenant_key.as_str(), "provisioned settings record");
            return Ok(ResolvedSettings {
                tenant_key,
                record,
                created: true,
            });
        }

        // Instance without a widget id and no site-wide record yet: nothing
        // to provision
        Ok(ResolvedSettings {
            record: SettingsRecord::transient(&tenant_key),
            tenant_key,
            created: false,
        })
    }

    /// Merge a partial preferences update into the matched-or-created record.
    ///
    /// Only the supplied keys are overwritten. Identity fields missing on a
    /// legacy record are repaired from the request, never overwritten once
    /// set; the component id is only repaired onto per-widget records so
    /// site-wide rows keep their null compId. Transient records return the
    /// merged view without persisting.
    pub async fn apply_update(
        &self,
        identity: &Identity,
        patch: &Value,
    ) -> Result<ResolvedSettings, StoreError> {
        let resolved = self.resolve(identity).await?;
        let mut record = resolved.record;

        merge_preferences(&mut record.preferences, patch);

        if !record.is_persisted() {
            return Ok(ResolvedSettings {
                tenant_key: resolved.tenant_key,
                record,
                created: resolved.created,
            });
        }

        if record.instance_id.is_none() {
            record.instance_id = identity.instance_id.clone();
        }
        if record.comp_id.is_none()
            && identity.comp_id.is_some()
            && record.tenant_key == resolved.tenant_key.as_str()
        {
            record.comp_id = identity.comp_id.clone();
        }

        let record = self.store.update(&record).await?;
        Ok(ResolvedSettings {
            tenant_key: resolved.tenant_key,
            record,
            created: resolved.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntitlementTier;
    use crate::settings::default_preferences;
    use crate::testing::MemorySettingsStore;
    use serde_json::json;

    fn identity(instance_id: Option<&str>, comp_id: Option<&str>) -> Identity {
        Identity {
            instance_id: instance_id.map(str::to_string),
            comp_id: comp_id.map(str::to_string),
            entitlement_tier: EntitlementTier::Free,
        }
    }

    #[tokio::test]
    async fn anonymous_resolution_never_touches_the_store() {
        let store = MemorySettingsStore::new();
        // Even a broken store must not matter for unauthenticated traffic
        store.set_failing(true);
        let resolver = SettingsResolver::new(&store);

        let resolved = resolver
            .resolve(&identity(None, Some("widget-1")))
            .await
            .unwrap();

        assert!(resolved.tenant_key.is_default());
        assert!(!resolved.record.is_persisted());
        assert_eq!(resolved.record.preferences, default_preferences());
    }

    #[tokio::test]
    async fn exact_match_wins() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);
        let id = identity(Some("site-1"), Some("widget-1"));

        let first = resolver.resolve(&id).await.unwrap();
        assert!(first.created);

        let second = resolver.resolve(&id).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn falls_back_to_site_wide_record() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);

        // Legacy record keyed by instance only
        let site = resolver
            .resolve(&identity(Some("site-1"), None))
            .await
            .unwrap();
        assert!(!site.record.is_persisted());

        let key = TenantKey::for_instance("site-1");
        let mut legacy = SettingsRecord::provisioned(&key, "site-1", "ignored", EntitlementTier::Light);
        legacy.comp_id = None;
        store.insert_if_absent(legacy).await.unwrap();

        let resolved = resolver
            .resolve(&identity(Some("site-1"), Some("widget-9")))
            .await
            .unwrap();

        // Widget gets the shared record, but keeps its own partition key
        assert!(!resolved.created);
        assert_eq!(resolved.record.tenant_key, "site-1");
        assert_eq!(resolved.tenant_key.as_str(), "site-1::widget-9");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn provisions_with_free_tier_when_no_sibling_exists() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);

        let resolved = resolver
            .resolve(&identity(Some("abc"), Some("xyz")))
            .await
            .unwrap();

        assert!(resolved.created);
        assert!(resolved.record.is_persisted());
        assert_eq!(resolved.record.tenant_key, "abc::xyz");
        assert!(resolved.record.entitlement_tier.is_free());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn new_widget_inherits_sibling_tier() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);

        let key = TenantKey::for_widget("abc", "old");
        let sibling = SettingsRecord::provisioned(&key, "abc", "old", EntitlementTier::Business);
        store.insert_if_absent(sibling).await.unwrap();

        let resolved = resolver
            .resolve(&identity(Some("abc"), Some("new")))
            .await
            .unwrap();

        assert!(resolved.created);
        assert_eq!(resolved.record.entitlement_tier, EntitlementTier::Business);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_first_requests_create_one_record() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);
        let id = identity(Some("site-race"), Some("widget-race"));

        let (a, b) = tokio::join!(resolver.resolve(&id), resolver.resolve(&id));
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(a.record.id, b.record.id);
    }

    #[tokio::test]
    async fn instance_without_comp_and_no_record_is_transient() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);

        let resolved = resolver
            .resolve(&identity(Some("site-1"), None))
            .await
            .unwrap();

        assert!(!resolved.record.is_persisted());
        assert_eq!(resolved.tenant_key.as_str(), "site-1");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn store_outage_propagates_for_authenticated_traffic() {
        let store = MemorySettingsStore::new();
        store.set_failing(true);
        let resolver = SettingsResolver::new(&store);

        let err = resolver
            .resolve(&identity(Some("site-1"), Some("widget-1")))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_groups() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);
        let id = identity(Some("site-1"), Some("widget-1"));

        resolver.resolve(&id).await.unwrap();
        let updated = resolver
            .apply_update(&id, &json!({ "appearance": { "primaryColor": "#111111" } }))
            .await
            .unwrap();

        assert_eq!(updated.record.preferences["appearance"]["primaryColor"], "#111111");
        assert_eq!(
            updated.record.preferences["layout"],
            default_preferences()["layout"]
        );

        // And the merge was persisted, not just returned
        let again = resolver.resolve(&id).await.unwrap();
        assert_eq!(again.record.preferences["appearance"]["primaryColor"], "#111111");
    }

    #[tokio::test]
    async fn update_repairs_missing_identity_fields() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);
        let id = identity(Some("site-1"), Some("widget-1"));

        // Legacy row under the exact widget key but with no identity columns
        let key = TenantKey::for_widget("site-1", "widget-1");
        let mut legacy = SettingsRecord::provisioned(&key, "site-1", "widget-1", EntitlementTier::Free);
        legacy.instance_id = None;
        legacy.comp_id = None;
        store.insert_if_absent(legacy).await.unwrap();

        let updated = resolver
            .apply_update(&id, &json!({ "layout": { "view": "list" } }))
            .await
            .unwrap();

        assert_eq!(updated.record.instance_id.as_deref(), Some("site-1"));
        assert_eq!(updated.record.comp_id.as_deref(), Some("widget-1"));
    }

    #[tokio::test]
    async fn update_leaves_site_record_comp_id_null() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);

        let key = TenantKey::for_instance("site-1");
        let mut legacy = SettingsRecord::provisioned(&key, "site-1", "ignored", EntitlementTier::Free);
        legacy.comp_id = None;
        store.insert_if_absent(legacy).await.unwrap();

        // Widget request falls back to the site record; repairing compId onto
        // it would corrupt the shared row
        let id = identity(Some("site-1"), Some("widget-1"));
        let updated = resolver
            .apply_update(&id, &json!({ "layout": { "view": "list" } }))
            .await
            .unwrap();

        assert_eq!(updated.record.comp_id, None);
        assert_eq!(updated.record.tenant_key, "site-1");
    }

    #[tokio::test]
    async fn anonymous_update_returns_merged_view_without_persisting() {
        let store = MemorySettingsStore::new();
        let resolver = SettingsResolver::new(&store);
        let id = identity(None, Some("widget-1"));

        let updated = resolver
            .apply_update(&id, &json!({ "behavior": { "clickAction": "popup" } }))
            .await
            .unwrap();

        assert!(!updated.record.is_persisted());
        assert_eq!(updated.record.preferences["behavior"]["clickAction"], "popup");
        assert_eq!(store.len().await, 0);
    }
}

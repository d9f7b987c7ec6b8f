//! Test doubles shared by unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::StoreError;
use crate::settings::store::SettingsStore;
use crate::settings::SettingsRecord;

/// In-memory settings store with the same atomicity contract as the
/// Postgres store: `insert_if_absent` holds the map lock across the
/// existence check and the insert, so a concurrent duplicate loses and gets
/// the winner back.
pub struct MemorySettingsStore {
    records: Mutex<HashMap<String, SettingsRecord>>,
    fail: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every store operation fail, simulating an outage.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn find_by_tenant_key(
        &self,
        tenant_key: &str,
    ) -> Result<Option<SettingsRecord>, StoreError> {
        self.check_available()?;
        Ok(self.records.lock().await.get(tenant_key).cloned())
    }

    async fn find_any_by_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<SettingsRecord>, StoreError> {
        self.check_available()?;
        let records = self.records.lock().await;
        // Oldest first, mirroring the SQL store's ordering
        Ok(records
            .values()
            .filter(|r| r.instance_id.as_deref() == Some(instance_id))
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        record: SettingsRecord,
    ) -> Result<SettingsRecord, StoreError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&record.tenant_key) {
            return Ok(existing.clone());
        }
        let record = SettingsRecord {
            id: record.id.or_else(|| Some(Uuid::new_v4())),
            ..record
        };
        records.insert(record.tenant_key.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, record: &SettingsRecord) -> Result<SettingsRecord, StoreError> {
        self.check_available()?;
        let id = record
            .id
            .ok_or_else(|| StoreError::NotFound("settings record is not persisted".to_string()))?;

        let mut records = self.records.lock().await;
        let key = records
            .iter()
            .find(|(_, r)| r.id == Some(id))
            .map(|(k, _)| k.clone())
            .ok_or_else(|| StoreError::NotFound(format!("settings record {}", id)))?;

        let updated = SettingsRecord {
            updated_at: Utc::now(),
            ..record.clone()
        };
        records.insert(key, updated.clone());
        Ok(updated)
    }
}

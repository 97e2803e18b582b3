// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory saga store.
//!
//! Keeps instance and event records in process memory. State does not
//! survive a restart; embedders that need durability bring their own
//! [`SagaStore`](super::SagaStore) backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{SagaEventRecord, SagaRecord, SagaStore};
use crate::error::{CoreError, Result};

#[derive(Default)]
struct MemoryStoreInner {
    instances: HashMap<String, SagaRecord>,
    events: Vec<SagaEventRecord>,
}

/// In-memory [`SagaStore`] backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryStoreInner>> {
        self.inner.lock().map_err(|_| CoreError::StoreError {
            operation: "lock".to_string(),
            details: "store mutex poisoned".to_string(),
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let count = inner.map(|i| i.instances.len()).unwrap_or(0);
        f.debug_struct("MemoryStore")
            .field("instances", &count)
            .finish()
    }
}

#[async_trait]
impl SagaStore for MemoryStore {
    async fn save_instance(&self, record: &SagaRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner
            .instances
            .insert(record.saga_id.clone(), record.clone());
        Ok(())
    }

    async fn load_instance(&self, saga_id: &str) -> Result<Option<SagaRecord>> {
        let inner = self.lock()?;
        Ok(inner.instances.get(saga_id).cloned())
    }

    async fn list_instances(&self, status: Option<&str>) -> Result<Vec<SagaRecord>> {
        let inner = self.lock()?;
        let mut records: Vec<SagaRecord> = inner
            .instances
            .values()
            .filter(|record| status.is_none_or(|s| record.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn insert_event(&self, event: &SagaEventRecord) -> Result<()> {
        let mut inner = self.lock()?;
        inner.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, saga_id: &str) -> Result<Vec<SagaEventRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .iter()
            .filter(|event| event.saga_id == saga_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(saga_id: &str, status: &str) -> SagaRecord {
        SagaRecord {
            saga_id: saga_id.to_string(),
            definition: "order".to_string(),
            status: status.to_string(),
            current_step: 0,
            step_outcomes: vec!["pending".to_string()],
            failed_step: None,
            all_compensations_succeeded: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = MemoryStore::new();
        store.save_instance(&record("s-1", "running")).await.unwrap();

        let loaded = store.load_instance("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.saga_id, "s-1");
        assert_eq!(loaded.status, "running");

        assert!(store.load_instance("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let store = MemoryStore::new();
        store.save_instance(&record("s-1", "running")).await.unwrap();

        let mut updated = record("s-1", "completed");
        updated.current_step = 3;
        store.save_instance(&updated).await.unwrap();

        let loaded = store.load_instance("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, "completed");
        assert_eq!(loaded.current_step, 3);
    }

    #[tokio::test]
    async fn test_list_instances_filters_by_status() {
        let store = MemoryStore::new();
        store.save_instance(&record("s-1", "running")).await.unwrap();
        store.save_instance(&record("s-2", "aborted")).await.unwrap();
        store.save_instance(&record("s-3", "running")).await.unwrap();

        let running = store.list_instances(Some("running")).await.unwrap();
        assert_eq!(running.len(), 2);

        let all = store.list_instances(None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_events_are_scoped_and_ordered() {
        let store = MemoryStore::new();
        for (saga_id, event_type) in [("s-1", "started"), ("s-2", "started"), ("s-1", "completed")]
        {
            store
                .insert_event(&SagaEventRecord {
                    saga_id: saga_id.to_string(),
                    event_type: event_type.to_string(),
                    step_index: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let events = store.list_events("s-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "started");
        assert_eq!(events[1].event_type, "completed");
    }
}

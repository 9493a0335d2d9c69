//! In-memory record store. Same semantics as the file store, nothing on disk.

use async_trait::async_trait;
use clinicdesk_core::error::StoreError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::record::{apply_update, record_id, stamp_new};

#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: RwLock<HashMap<ResourceKind, Vec<Resource>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim (no id or meta stamping).
    pub async fn seed(&self, kind: ResourceKind, resource: Resource) {
        self.collections
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(resource);
    }

    pub async fn count(&self, kind: ResourceKind) -> usize {
        self.collections
            .read()
            .await
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&kind)
            .and_then(|rs| rs.iter().find(|r| record_id(r) == Some(id)).cloned()))
    }

    async fn create(&self, kind: ResourceKind, partial: Resource) -> Result<Resource, StoreError> {
        let resource = stamp_new(kind, partial);
        self.collections
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(resource.clone());
        Ok(resource)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        partial: Resource,
    ) -> Result<Option<Resource>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(existing) = collections
            .get_mut(&kind)
            .and_then(|rs| rs.iter_mut().find(|r| record_id(r) == Some(id)))
        else {
            return Ok(None);
        };
        *existing = apply_update(existing, partial);
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(resources) = collections.get_mut(&kind) else {
            return Ok(false);
        };
        let before = resources.len();
        resources.retain(|r| record_id(r) != Some(id));
        Ok(resources.len() != before)
    }
}

//! File-backed record store: one JSON bundle per record kind.
//!
//! Storage location: `<data_dir>/<collection>.json`, e.g. `data/patients.json`.
//! Every mutation re-reads the bundle, applies the change and rewrites the
//! whole file. Reads and mutations within this process are serialised, so a
//! read never sees a half-written file; another process writing the same
//! files gets last-write-wins.

use async_trait::async_trait;
use clinicdesk_core::error::StoreError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::record::{Bundle, apply_update, record_id, stamp_new};

pub struct FileRecordStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileRecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, kind: ResourceKind) -> PathBuf {
        self.data_dir.join(format!("{}.json", kind.collection()))
    }

    /// Read a bundle; a missing file becomes an empty bundle on disk.
    /// Callers hold `lock`.
    async fn read(&self, kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        let path = self.path(kind);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let bundle: Bundle = serde_json::from_str(&content).map_err(|e| {
                    StoreError::Serialization(format!("{}: {e}", path.display()))
                })?;
                Ok(bundle.into_resources())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Creating empty bundle");
                self.write(kind, Vec::new()).await?;
                Ok(Vec::new())
            }
            Err(e) => Err(StoreError::Io(format!("{}: {e}", path.display()))),
        }
    }

    async fn write(&self, kind: ResourceKind, resources: Vec<Resource>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create data directory: {e}")))?;

        let content = serde_json::to_string_pretty(&Bundle::from_resources(resources))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.path(kind);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read(kind).await
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Resource>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read(kind)
            .await?
            .into_iter()
            .find(|r| record_id(r) == Some(id)))
    }

    async fn create(&self, kind: ResourceKind, partial: Resource) -> Result<Resource, StoreError> {
        let _guard = self.lock.lock().await;
        let mut resources = self.read(kind).await?;
        let resource = stamp_new(kind, partial);
        resources.push(resource.clone());
        self.write(kind, resources).await?;
        debug!(kind = %kind, id = record_id(&resource).unwrap_or_default(), "Record created");
        Ok(resource)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        partial: Resource,
    ) -> Result<Option<Resource>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut resources = self.read(kind).await?;
        let Some(slot) = resources.iter().position(|r| record_id(r) == Some(id)) else {
            return Ok(None);
        };
        let updated = apply_update(&resources[slot], partial);
        resources[slot] = updated.clone();
        self.write(kind, resources).await?;
        debug!(kind = %kind, id, "Record updated");
        Ok(Some(updated))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut resources = self.read(kind).await?;
        let before = resources.len();
        resources.retain(|r| record_id(r) != Some(id));
        if resources.len() == before {
            return Ok(false);
        }
        self.write(kind, resources).await?;
        debug!(kind = %kind, id, "Record deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn object(v: serde_json::Value) -> Resource {
        v.as_object().cloned().unwrap()
    }

    fn temp_store() -> (FileRecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::new(dir.path().join("data"));
        (store, dir)
    }

    #[tokio::test]
    async fn missing_file_is_created_empty() {
        let (store, _dir) = temp_store();
        assert!(store.list(ResourceKind::Patients).await.unwrap().is_empty());

        let raw = std::fs::read_to_string(store.data_dir().join("patients.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["resourceType"], "Bundle");
        assert_eq!(value["total"], 0);
    }

    #[tokio::test]
    async fn create_persists_across_instances() {
        let (store, _dir) = temp_store();
        let created = store
            .create(ResourceKind::Patients, object(json!({ "gender": "female" })))
            .await
            .unwrap();
        let id = record_id(&created).unwrap().to_string();

        let reopened = FileRecordStore::new(store.data_dir());
        let found = reopened.get(ResourceKind::Patients, &id).await.unwrap().unwrap();
        assert_eq!(found["gender"], "female");
        assert_eq!(found["resourceType"], "Patient");

        let raw = std::fs::read_to_string(store.data_dir().join("patients.json")).unwrap();
        assert!(raw.contains(&format!("urn:uuid:{id}")));
    }

    #[tokio::test]
    async fn medication_requests_use_hyphenated_file() {
        let (store, _dir) = temp_store();
        store
            .create(ResourceKind::MedicationRequests, Resource::new())
            .await
            .unwrap();
        assert!(store.data_dir().join("medication-requests.json").exists());
    }

    #[tokio::test]
    async fn update_and_delete_report_not_found() {
        let (store, _dir) = temp_store();
        assert!(
            store
                .update(ResourceKind::Conditions, "con-nope", Resource::new())
                .await
                .unwrap()
                .is_none()
        );
        assert!(!store.delete(ResourceKind::Conditions, "con-nope").await.unwrap());
    }

    #[tokio::test]
    async fn update_bumps_version_on_disk() {
        let (store, _dir) = temp_store();
        let created = store
            .create(ResourceKind::Encounters, object(json!({ "status": "in-progress" })))
            .await
            .unwrap();
        let id = record_id(&created).unwrap().to_string();

        let updated = store
            .update(ResourceKind::Encounters, &id, object(json!({ "status": "finished" })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["meta"]["versionId"], "2");

        let stored = store.get(ResourceKind::Encounters, &id).await.unwrap().unwrap();
        assert_eq!(stored["status"], "finished");
    }

    #[tokio::test]
    async fn delete_removes_only_target() {
        let (store, _dir) = temp_store();
        let a = store.create(ResourceKind::Observations, Resource::new()).await.unwrap();
        let b = store.create(ResourceKind::Observations, Resource::new()).await.unwrap();

        assert!(
            store
                .delete(ResourceKind::Observations, record_id(&a).unwrap())
                .await
                .unwrap()
        );
        let remaining = store.list(ResourceKind::Observations).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(record_id(&remaining[0]), record_id(&b));
    }

    #[tokio::test]
    async fn corrupt_bundle_is_an_error() {
        let (store, _dir) = temp_store();
        std::fs::create_dir_all(store.data_dir()).unwrap();
        std::fs::write(store.data_dir().join("patients.json"), "{ not json").unwrap();
        let err = store.list(ResourceKind::Patients).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn concurrent_creates_in_process_are_all_kept() {
        let (store, _dir) = temp_store();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(ResourceKind::Practitioners, Resource::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list(ResourceKind::Practitioners).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn first_reads_racing_creates_lose_nothing() {
        let (store, _dir) = temp_store();
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.list(ResourceKind::Conditions).await.map(|_| ())
                } else {
                    store
                        .create(ResourceKind::Conditions, Resource::new())
                        .await
                        .map(|_| ())
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list(ResourceKind::Conditions).await.unwrap().len(), 8);
    }
}

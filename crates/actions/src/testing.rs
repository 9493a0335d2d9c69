use async_trait::async_trait;
use clinicdesk_core::error::StoreError;
use clinicdesk_core::record::{RecordStore, Resource, ResourceKind};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Store that records how often it is touched and holds nothing.
#[derive(Default)]
pub struct CountingStore {
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn list(&self, _kind: ResourceKind) -> Result<Vec<Resource>, StoreError> {
        self.touch();
        Ok(Vec::new())
    }

    async fn get(&self, _kind: ResourceKind, _id: &str) -> Result<Option<Resource>, StoreError> {
        self.touch();
        Ok(None)
    }

    async fn create(&self, _kind: ResourceKind, partial: Resource) -> Result<Resource, StoreError> {
        self.touch();
        Ok(partial)
    }

    async fn update(
        &self,
        _kind: ResourceKind,
        _id: &str,
        _partial: Resource,
    ) -> Result<Option<Resource>, StoreError> {
        self.touch();
        Ok(None)
    }

    async fn delete(&self, _kind: ResourceKind, _id: &str) -> Result<bool, StoreError> {
        self.touch();
        Ok(false)
    }
}
